//! Access extraction.
//!
//! Replays every reachable block on its resolved input state and records one
//! [`Access`] per load or store, in execution order. Each record carries the
//! symbolic address of the access and whether it goes through the data cache.

use log::{debug, warn};
use strum::Display;

use crate::{
    address::{
        poly::{Poly, PolyDomain},
        resolve::{AddressResolver, Interpreter, MemoryOp, ResolvedStates},
    },
    analysis::{
        cfg::ControlFlowGraph,
        sem::{AccessRange, MemType},
    },
    cache::MemoryMap,
    utils::graph::NodeId,
    Error, Result,
};

/// Direction of a memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum AccessKind {
    /// Memory read.
    #[strum(serialize = "load")]
    Load,
    /// Memory write.
    #[strum(serialize = "store")]
    Store,
}

/// One load or store of the program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Access {
    /// Block holding the instruction.
    pub block: NodeId,
    /// Address of the accessing instruction.
    pub instruction: u32,
    /// Load or store.
    pub kind: AccessKind,
    /// Symbolic address.
    pub reference: Poly,
    /// Transfer type.
    pub ty: MemType,
    /// True if the access goes through the data cache.
    pub cached: bool,
    /// Declared range of the instruction, if any.
    pub range: Option<AccessRange>,
}

impl Access {
    /// Returns true if the address is unknown.
    #[must_use]
    pub const fn is_top(&self) -> bool {
        self.reference.is_top()
    }
}

/// Accesses of every block, in execution order within a block.
#[derive(Debug, Clone, Default)]
pub struct AccessTable {
    blocks: Vec<Vec<Access>>,
}

impl AccessTable {
    /// Returns the accesses of `block`.
    #[must_use]
    pub fn block(&self, block: NodeId) -> &[Access] {
        self.blocks.get(block.index()).map_or(&[], Vec::as_slice)
    }

    /// Iterates over every access, block by block.
    pub fn iter(&self) -> impl Iterator<Item = &Access> {
        self.blocks.iter().flatten()
    }

    /// Returns the total number of accesses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.iter().map(Vec::len).sum()
    }

    /// Returns true if the program accesses no memory.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(Vec::is_empty)
    }
}

/// Builds the [`AccessTable`] of a program from its resolved states.
pub struct AccessBuilder<'a, 'g> {
    polys: &'a PolyDomain<'g>,
    interpreter: Interpreter<'a, 'g>,
    memory: &'a MemoryMap,
}

impl<'a, 'g> AccessBuilder<'a, 'g> {
    /// Creates a builder replaying blocks with the resolver's interpreter.
    #[must_use]
    pub fn new(resolver: &AddressResolver<'a, 'g>, polys: &'a PolyDomain<'g>, memory: &'a MemoryMap) -> Self {
        Self {
            polys,
            interpreter: resolver.interpreter(),
            memory,
        }
    }

    /// Extracts the accesses of every reachable block.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnmappedAddress`] if an access lies outside every
    /// memory bank.
    pub fn build(&self, states: &ResolvedStates) -> Result<AccessTable> {
        let cfg: &ControlFlowGraph = self.polys.cfg();
        let mut blocks = vec![Vec::new(); cfg.block_count()];
        for (id, block) in cfg.blocks() {
            let Some(input) = states.input(id) else {
                continue;
            };
            let mut state = input.clone();
            let mut ops = Vec::new();
            self.interpreter
                .execute_block(block, &mut state, &mut |op| ops.push(op));
            for op in ops {
                let access = self.access(id, op)?;
                blocks[id.index()].push(access);
            }
        }
        let table = AccessTable { blocks };
        debug!("extracted {} accesses", table.len());
        Ok(table)
    }

    fn access(&self, block: NodeId, op: MemoryOp<'_>) -> Result<Access> {
        let instruction = op.instruction.address;
        let range = op.instruction.access_range;
        let lowest = match op.address {
            Poly::Top => {
                warn!(
                    "{} at {instruction:#010x} has an unknown address",
                    op.kind
                );
                range.map(|r| r.lo)
            }
            value => self.polys.to_address(value).map(|span| span.base),
        };
        let cached = match lowest {
            Some(address) => {
                self.memory
                    .bank(address)
                    .ok_or(Error::UnmappedAddress { address, instruction })?
                    .cached
            }
            None => true,
        };
        debug!(
            "{} at {instruction:#010x}: {}{}",
            op.kind,
            self.polys.display(op.address),
            if cached { "" } else { " (uncached)" }
        );
        Ok(Access {
            block,
            instruction,
            kind: op.kind,
            reference: op.address,
            ty: op.ty,
            cached,
            range,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        address::initial::InitialState,
        analysis::{
            cfg::{BasicBlock, CfgBuilder, LoopBound},
            sem::{BinOp, Instruction, Reg, SemOp},
        },
        cache::{AnalysisConfig, MemoryBank},
    };

    const SP: Reg = Reg::Machine(13);
    const R0: Reg = Reg::Machine(0);
    const R1: Reg = Reg::Machine(1);

    fn load(address: u32, addr: Reg) -> Instruction {
        Instruction::new(
            address,
            vec![SemOp::Load {
                dst: R1,
                addr,
                ty: MemType::Int32,
            }],
        )
    }

    fn program(base: i32) -> (ControlFlowGraph, NodeId) {
        let mut b = CfgBuilder::new();
        let entry = b.add_block(
            BasicBlock::new(0x100)
                .with_instruction(Instruction::new(0x100, vec![SemOp::SetI { dst: R0, imm: base }]))
                .with_instruction(load(0x104, R0))
                .with_instruction(load(0x108, R1).with_access_range(0x9000, 0x9fff)),
        );
        let body = b.add_block(BasicBlock::new(0x10c).with_instruction(load(0x10c, R0)).with_instruction(
            Instruction::new(
                0x110,
                vec![
                    SemOp::SetI {
                        dst: Reg::Temp(0),
                        imm: 16,
                    },
                    SemOp::Binary {
                        op: BinOp::Add,
                        dst: R0,
                        a: R0,
                        b: Reg::Temp(0),
                    },
                ],
            ),
        ));
        b.add_edge(entry, body).unwrap();
        b.add_edge(body, body).unwrap();
        b.set_loop_bound(body, LoopBound::exact(4));
        (b.build(entry).unwrap(), body)
    }

    fn extract(cfg: &ControlFlowGraph, memory: &MemoryMap) -> Result<AccessTable> {
        let polys = PolyDomain::new(cfg);
        let init = InitialState::new(SP);
        let config = AnalysisConfig::default();
        let resolver = AddressResolver::new(&polys, &init, &config);
        let states = resolver.resolve()?;
        AccessBuilder::new(&resolver, &polys, memory).build(&states)
    }

    #[test_log::test]
    fn test_extraction() {
        let (cfg, body) = program(0x1000);
        let memory = MemoryMap::new()
            .with_bank(MemoryBank::new("ram", 0, 0x8000, true, 10))
            .unwrap()
            .with_bank(MemoryBank::new("io", 0x9000, 0x1000, false, 30))
            .unwrap();
        let table = extract(&cfg, &memory).unwrap();

        assert_eq!(table.len(), 3);
        let entry: Vec<_> = table.block(cfg.entry()).iter().map(|a| (a.instruction, a.cached)).collect();
        assert_eq!(entry, vec![(0x104, true), (0x108, false)]);
        assert!(!table.block(cfg.entry())[0].is_top());
        assert!(table.block(cfg.entry())[1].is_top());

        let looped = &table.block(body)[0];
        assert_eq!(looped.kind, AccessKind::Load);
        assert_eq!(looped.kind.to_string(), "load");
        assert!(!looped.reference.is_top());
        assert!(looped.cached);
    }

    #[test]
    fn test_unmapped_address() {
        let (cfg, _) = program(0x1000);
        let memory = MemoryMap::new()
            .with_bank(MemoryBank::new("ram", 0x4000, 0x1000, true, 10))
            .unwrap();
        let err = extract(&cfg, &memory).unwrap_err();
        assert!(matches!(
            err,
            Error::UnmappedAddress {
                address: 0x1000,
                instruction: 0x104
            }
        ));
    }
}
