//! Whole-program data cache classification.
//!
//! [`PidAnalysis`] runs the pipeline end to end:
//!
//! 1. [`AddressResolver`] computes symbolic register and memory contents;
//! 2. [`AccessBuilder`] turns every load and store into an [`Access`];
//! 3. one [`SetAnalysis`] per cache set computes the abstract cache state at
//!    every block and classifies the accesses touching its set;
//! 4. per-set counters are summed into one [`ClassifiedAccess`] per access.
//!
//! Set analyses share nothing but read-only inputs. With
//! [`AnalysisConfig::parallel`] they run on the rayon thread pool; the
//! results are identical either way.
//!
//! # Examples
//!
//! ```rust,ignore
//! use pidcache::cache::{CacheConfig, CacheConfiguration, MemoryMap, PidAnalysis, ReplacementPolicy};
//!
//! let caches = CacheConfiguration::data_only(CacheConfig::new(4, 6, 4, ReplacementPolicy::Lru)?);
//! let results = PidAnalysis::new(&cfg, &caches, &MemoryMap::flat(10)).run()?;
//! for access in results.accesses() {
//!     println!("{:#x} {} {}", access.access.instruction, access.category(), access.misses);
//! }
//! ```

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::{
    address::{
        access::{Access, AccessBuilder, AccessTable},
        initial::InitialState,
        poly::{Poly, PolyDomain},
        resolve::AddressResolver,
    },
    analysis::{
        cfg::{CfgEdge, ControlFlowGraph},
        dataflow::{DataFlowAnalysis, DataFlowSolver},
    },
    cache::{
        banks::MemoryMap,
        config::{AnalysisConfig, CacheConfig, CacheConfiguration},
        refs::{ExhaustiveRefManager, RefIter, RefManager},
        state::{CacheDomain, CacheState},
        stats::{Category, MissCount, Stat, Statistics},
    },
    utils::graph::NodeId,
    Result,
};

/// Returns true if the trials of a reference can be enumerated.
fn enumerable(polys: &PolyDomain<'_>, reference: Poly, cap: u64) -> bool {
    RefIter::new(polys, reference).is_some_and(|it| it.size() <= cap)
}

/// Counters of one set analysis, laid out like the [`AccessTable`].
type SetCounts = Vec<Vec<Option<(Stat, MissCount)>>>;

/// Cache analysis of a single set.
pub struct SetAnalysis<'a, 'g, R: RefManager> {
    domain: CacheDomain<'a, 'g, R>,
    polys: &'a PolyDomain<'g>,
    refs: &'a R,
    accesses: &'a AccessTable,
    cap: u64,
}

impl<'a, 'g, R: RefManager> SetAnalysis<'a, 'g, R> {
    /// Creates the analysis of `set`.
    #[must_use]
    pub fn new(
        polys: &'a PolyDomain<'g>,
        refs: &'a R,
        cache: CacheConfig,
        set: u32,
        accesses: &'a AccessTable,
        cap: u64,
    ) -> Self {
        Self {
            domain: CacheDomain::new(polys, refs, cache, set, cap),
            polys,
            refs,
            accesses,
            cap,
        }
    }

    /// Computes the fixed point and classifies the accesses of the set.
    ///
    /// TOP and non-enumerable references are skipped; they are classified
    /// once for all sets by the caller.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::IterationLimit`] if the fixed point exceeds
    /// `max_visits`.
    pub fn run(self, cfg: &ControlFlowGraph, max_visits: usize) -> Result<SetCounts> {
        let mut solver = DataFlowSolver::new(cfg, self).with_max_visits(max_visits);
        let results = solver.solve()?;
        let mut analysis = solver.into_analysis();
        let table = analysis.accesses;

        let mut counts: SetCounts = Vec::with_capacity(cfg.block_count());
        for (id, _) in cfg.blocks() {
            let accesses = table.block(id);
            let mut block = vec![None; accesses.len()];
            let mut state = results.in_state(id).copied().unwrap_or(CacheState::Bottom);
            for (slot, access) in block.iter_mut().zip(accesses) {
                if !access.is_top()
                    && enumerable(analysis.polys, access.reference, analysis.cap)
                    && analysis.refs.concerns(access.reference, analysis.domain.set())
                {
                    *slot = Some(analysis.domain.count_misses(state, access));
                }
                state = analysis.domain.update(state, access);
            }
            counts.push(block);
        }
        debug!(
            "set {}: fixed point after {} visits, {} nodes",
            analysis.domain.set(),
            results.iterations,
            analysis.domain.node_count()
        );
        Ok(counts)
    }
}

impl<R: RefManager> DataFlowAnalysis for SetAnalysis<'_, '_, R> {
    type State = CacheState;

    fn bottom(&self) -> CacheState {
        CacheState::Bottom
    }

    fn entry_state(&self) -> CacheState {
        CacheState::EMPTY
    }

    fn join(&mut self, a: &CacheState, b: &CacheState) -> CacheState {
        self.domain.join(*a, *b)
    }

    fn equals(&self, a: &CacheState, b: &CacheState) -> bool {
        self.domain.equals(*a, *b)
    }

    fn transfer(&mut self, _cfg: &ControlFlowGraph, block: NodeId, input: &CacheState) -> CacheState {
        let mut state = *input;
        if state == CacheState::Bottom {
            return state;
        }
        for access in self.accesses.block(block) {
            state = self.domain.update(state, access);
        }
        state
    }

    /// Loops left are closed innermost first; a back edge then drops stale
    /// generations and an edge into a header opens a level.
    fn propagate(&mut self, _cfg: &ControlFlowGraph, edge: &CfgEdge, output: &CacheState) -> CacheState {
        let mut state = *output;
        for &header in edge.exited_loops() {
            state = self.domain.leave(state, header, edge.source());
        }
        if edge.is_back_edge() {
            state = self.domain.back(state);
        } else if edge.enters_loop() {
            state = self.domain.enter(state);
        }
        state
    }
}

/// An access with its classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedAccess {
    /// The access.
    pub access: Access,
    /// Trial counters, summed over every set.
    pub stat: Stat,
    /// Misses the access contributes per execution of `relative_to`, or
    /// over the whole run when `None`.
    pub misses: MissCount,
    /// Loop header the miss count is relative to.
    pub relative_to: Option<NodeId>,
}

impl ClassifiedAccess {
    /// Returns the class of the access.
    #[must_use]
    pub const fn category(&self) -> Category {
        self.stat.category()
    }
}

/// Classification of every access of a program.
pub struct PidResults<'g> {
    polys: PolyDomain<'g>,
    accesses: Vec<ClassifiedAccess>,
    statistics: Statistics,
}

impl<'g> PidResults<'g> {
    /// Returns the address domain the references live in.
    #[must_use]
    pub fn polys(&self) -> &PolyDomain<'g> {
        &self.polys
    }

    /// Returns every access, block by block in execution order.
    #[must_use]
    pub fn accesses(&self) -> &[ClassifiedAccess] {
        &self.accesses
    }

    /// Returns the accesses of the instruction at `address`.
    pub fn at(&self, address: u32) -> impl Iterator<Item = &ClassifiedAccess> {
        self.accesses
            .iter()
            .filter(move |a| a.access.instruction == address)
    }

    /// Returns the classification summary.
    #[must_use]
    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }
}

/// The data cache analysis of one program.
pub struct PidAnalysis<'g, 'a> {
    cfg: &'g ControlFlowGraph,
    caches: &'a CacheConfiguration,
    memory: &'a MemoryMap,
    init: InitialState,
    config: AnalysisConfig,
}

impl<'g, 'a> PidAnalysis<'g, 'a> {
    /// Creates an analysis with the default initial state and configuration.
    ///
    /// The results borrow only the control flow graph.
    #[must_use]
    pub fn new(cfg: &'g ControlFlowGraph, caches: &'a CacheConfiguration, memory: &'a MemoryMap) -> Self {
        Self {
            cfg,
            caches,
            memory,
            init: InitialState::default(),
            config: AnalysisConfig::default(),
        }
    }

    /// Sets the program state at entry.
    #[must_use]
    pub fn with_initial_state(mut self, init: InitialState) -> Self {
        self.init = init;
        self
    }

    /// Sets the analysis configuration.
    #[must_use]
    pub fn with_config(mut self, config: AnalysisConfig) -> Self {
        self.config = config;
        self
    }

    /// Runs the whole pipeline.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::UnifiedCache`], [`crate::Error::MissingDataCache`] or
    ///   [`crate::Error::UnsupportedPolicy`] for an unusable cache configuration
    /// - [`crate::Error::UnmappedAddress`] for an access outside every bank
    /// - [`crate::Error::IterationLimit`] if a fixed point does not converge
    ///   within the visit budget
    pub fn run(&self) -> Result<PidResults<'g>> {
        let cache = *self.caches.data_cache()?;
        let polys = PolyDomain::new(self.cfg);
        let accesses = self.classify(&polys, cache)?;
        let statistics = Statistics::collect(accesses.iter().map(|a| &a.stat));
        info!("data cache classification: {statistics}");
        Ok(PidResults {
            polys,
            accesses,
            statistics,
        })
    }

    fn classify(&self, polys: &PolyDomain<'g>, cache: CacheConfig) -> Result<Vec<ClassifiedAccess>> {
        let config = &self.config;
        let resolver = AddressResolver::new(polys, &self.init, config);
        let states = resolver.resolve()?;
        let table = AccessBuilder::new(&resolver, polys, self.memory).build(&states)?;

        let cap = config.enumeration_cap;
        let refs = ExhaustiveRefManager::new(polys, cache, cap);
        let run_set = |set: u32| {
            SetAnalysis::new(polys, &refs, cache, set, &table, cap).run(self.cfg, config.max_visits)
        };
        let per_set: Vec<SetCounts> = if config.parallel {
            (0..cache.set_count()).into_par_iter().map(run_set).collect::<Result<_>>()?
        } else {
            (0..cache.set_count()).map(run_set).collect::<Result<_>>()?
        };

        let mut classified = Vec::with_capacity(table.len());
        for (id, _) in self.cfg.blocks() {
            for (index, access) in table.block(id).iter().enumerate() {
                let (stat, misses) = if access.is_top() {
                    (Stat::unclassified(), self.unknown_misses(id))
                } else if !enumerable(polys, access.reference, cap) {
                    warn!(
                        "{} at {:#010x} not classified: iteration space of {} cannot be enumerated",
                        access.kind,
                        access.instruction,
                        polys.display(access.reference)
                    );
                    (Stat::unclassified(), MissCount::Unbounded)
                } else {
                    per_set
                        .iter()
                        .filter_map(|counts| counts[id.index()][index])
                        .fold((Stat::default(), MissCount::ZERO), |(s, m), (t, n)| (s + t, m + n))
                };
                classified.push(ClassifiedAccess {
                    access: access.clone(),
                    stat,
                    misses,
                    relative_to: polys.relative_to(id, access.reference),
                });
            }
        }
        Ok(classified)
    }

    /// Misses of a TOP access: one per execution of its innermost loop.
    fn unknown_misses(&self, block: NodeId) -> MissCount {
        match self.cfg.loops().innermost_header(block) {
            None => MissCount::Bounded(1),
            Some(header) => self
                .cfg
                .max_iteration(header)
                .map_or(MissCount::Unbounded, |n| MissCount::Bounded(u64::from(n))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::{
            cfg::{BasicBlock, CfgBuilder, LoopBound},
            sem::{BinOp, Instruction, MemType, Reg, SemOp},
        },
        cache::config::ReplacementPolicy,
        Error,
    };

    const R0: Reg = Reg::Machine(0);
    const R1: Reg = Reg::Machine(1);
    const T0: Reg = Reg::Temp(0);

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

    /// r0 = 0x1000; loop { load [r0]; load [0x2000]; r0 += 16 }
    fn sweep(bound: LoopBound) -> ControlFlowGraph {
        let mut b = CfgBuilder::new();
        let entry = b.add_block(
            BasicBlock::new(0x100)
                .with_instruction(Instruction::new(0x100, vec![SemOp::SetI { dst: R0, imm: 0x1000 }])),
        );
        let body = b.add_block(
            BasicBlock::new(0x104)
                .with_instruction(load(0x104, R0))
                .with_instruction(Instruction::new(
                    0x108,
                    vec![
                        SemOp::SetI { dst: T0, imm: 0x2000 },
                        SemOp::Load {
                            dst: R1,
                            addr: T0,
                            ty: MemType::Int32,
                        },
                    ],
                ))
                .with_instruction(Instruction::new(
                    0x10c,
                    vec![
                        SemOp::SetI { dst: T0, imm: 16 },
                        SemOp::Binary {
                            op: BinOp::Add,
                            dst: R0,
                            a: R0,
                            b: T0,
                        },
                    ],
                )),
        );
        let exit = b.add_block(BasicBlock::new(0x110));
        b.add_edge(entry, body).unwrap();
        b.add_edge(body, body).unwrap();
        b.add_edge(body, exit).unwrap();
        b.set_loop_bound(body, bound);
        b.build(entry).unwrap()
    }

    fn caches(set_bits: u32) -> CacheConfiguration {
        CacheConfiguration::data_only(CacheConfig::new(4, set_bits, 4, ReplacementPolicy::Lru).unwrap())
    }

    #[test_log::test]
    fn test_sequential_and_parallel_agree() {
        let cfg = sweep(LoopBound::exact(8));
        let caches = caches(2);
        let memory = MemoryMap::flat(10);
        let seq = PidAnalysis::new(&cfg, &caches, &memory).run().unwrap();
        let par = PidAnalysis::new(&cfg, &caches, &memory)
            .with_config(AnalysisConfig::parallel())
            .run()
            .unwrap();
        assert_eq!(seq.accesses().len(), 2);
        let strip = |r: &PidResults<'_>| -> Vec<(Stat, MissCount)> {
            r.accesses().iter().map(|a| (a.stat, a.misses)).collect()
        };
        assert_eq!(strip(&seq), strip(&par));

        // eight lines spread over four sets: one trial each
        let array = seq.at(0x104).next().unwrap();
        assert_eq!(array.stat.trials(), 8);
        assert_eq!(array.relative_to, cfg.loops().innermost_header(array.access.block));

        let scalar = seq.at(0x108).next().unwrap();
        assert_eq!(scalar.stat.trials(), 1);
        assert_eq!(scalar.category(), Category::Persistent);
    }

    #[test]
    fn test_unknown_bound_is_not_classified() {
        let cfg = sweep(LoopBound::unknown());
        let caches = caches(0);
        let memory = MemoryMap::flat(10);
        let results = PidAnalysis::new(&cfg, &caches, &memory).run().unwrap();
        let array = results.at(0x104).next().unwrap();
        assert_eq!(array.category(), Category::NotClassified);
        assert_eq!(array.misses, MissCount::Unbounded);
        assert_eq!(array.stat.trials(), 1);
        assert_eq!(results.statistics().all.accesses, 2);
    }

    #[test]
    fn test_configuration_errors() {
        let cfg = sweep(LoopBound::exact(2));
        let memory = MemoryMap::flat(10);
        let fifo = CacheConfiguration::data_only(CacheConfig::new(4, 0, 4, ReplacementPolicy::Fifo).unwrap());
        assert!(matches!(
            PidAnalysis::new(&cfg, &fifo, &memory).run(),
            Err(Error::UnsupportedPolicy(ReplacementPolicy::Fifo))
        ));
        let budget = AnalysisConfig::default().with_max_visits(1);
        assert!(matches!(
            PidAnalysis::new(&cfg, &caches(0), &memory).with_config(budget).run(),
            Err(Error::IterationLimit(1))
        ));
    }
}
