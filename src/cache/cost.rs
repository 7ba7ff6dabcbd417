//! Miss penalties for downstream timing models.

use crate::{
    address::{access::AccessKind, poly::PolyDomain},
    cache::{analysis::ClassifiedAccess, banks::MemoryMap},
};

/// Returns the cycles the misses of `access` cost, `None` if unbounded.
///
/// The latency is that of the bank holding the lowest address of the
/// reference. TOP references, and references whose range is unknown, are
/// charged the worst latency of any bank.
#[must_use]
pub fn miss_penalty(polys: &PolyDomain<'_>, access: &ClassifiedAccess, memory: &MemoryMap) -> Option<u64> {
    let misses = access.misses.bound()?;
    let bank = polys
        .to_address(access.access.reference)
        .and_then(|span| memory.bank(span.base));
    let latency = match (access.access.kind, bank) {
        (AccessKind::Load, Some(bank)) => bank.read_latency,
        (AccessKind::Store, Some(bank)) => bank.write_latency,
        (AccessKind::Load, None) => memory.worst_read_latency(),
        (AccessKind::Store, None) => memory.worst_write_latency(),
    };
    Some(misses.saturating_mul(u64::from(latency)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        address::{access::Access, poly::Poly},
        analysis::{
            cfg::{BasicBlock, CfgBuilder},
            sem::MemType,
        },
        cache::{
            banks::MemoryBank,
            stats::{MissCount, Stat},
        },
        utils::graph::NodeId,
    };

    fn classified(kind: AccessKind, reference: Poly, misses: MissCount) -> ClassifiedAccess {
        ClassifiedAccess {
            access: Access {
                block: NodeId::new(0),
                instruction: 0x100,
                kind,
                reference,
                ty: MemType::Int32,
                cached: true,
                range: None,
            },
            stat: Stat::default(),
            misses,
            relative_to: None,
        }
    }

    #[test]
    fn test_penalty_by_bank() {
        let mut b = CfgBuilder::new();
        let entry = b.add_block(BasicBlock::new(0x100));
        let cfg = b.build(entry).unwrap();
        let polys = PolyDomain::new(&cfg);
        let memory = MemoryMap::new()
            .with_bank(MemoryBank::new("sram", 0, 0x1000, true, 2))
            .unwrap()
            .with_bank(MemoryBank::new("dram", 0x1000, 0x1000, true, 20).with_write_latency(30))
            .unwrap();

        let load = classified(AccessKind::Load, polys.address(0x1010), MissCount::Bounded(3));
        assert_eq!(miss_penalty(&polys, &load, &memory), Some(60));
        let store = classified(AccessKind::Store, polys.address(0x10), MissCount::Bounded(3));
        assert_eq!(miss_penalty(&polys, &store, &memory), Some(6));
        let top = classified(AccessKind::Store, Poly::Top, MissCount::Bounded(1));
        assert_eq!(miss_penalty(&polys, &top, &memory), Some(30));
        let unbounded = classified(AccessKind::Load, polys.address(0x10), MissCount::Unbounded);
        assert_eq!(miss_penalty(&polys, &unbounded, &memory), None);
    }
}
