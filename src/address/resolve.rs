//! Address resolution by abstract interpretation.
//!
//! The interpreter tracks a [`Poly`] value per register and per known memory
//! word through the semantic operations of every block, to a fixed point over
//! the control flow graph. Its only purpose is to give each load and store a
//! symbolic address, so arithmetic outside the address domain (comparisons,
//! most bitwise operators, divisions) simply yields TOP.
//!
//! # Loop headers
//!
//! A plain join at a loop header would turn every loop-carried pointer into
//! TOP on the second visit. Headers therefore combine their inputs in two
//! stages:
//!
//! 1. `in` is the join of the states arriving from outside the loop, and
//!    `back` the join of the back-edge states;
//! 2. `back` is widened against the value the header produced on the previous
//!    visit ([`PolyDomain::exwiden`]), which turns a constant per-iteration
//!    increment into a `k*I(h)` term, and the result is joined with `in`
//!    ([`PolyDomain::exloop_join`]).
//!
//! Leaving a loop replaces its counter by the last iteration
//! ([`PolyDomain::filter`]).

use std::collections::{BTreeMap, HashMap};

use log::debug;

use crate::{
    address::{
        access::AccessKind,
        initial::InitialState,
        memory::Memory,
        poly::{Poly, PolyDomain},
    },
    analysis::{
        cfg::{BasicBlock, CfgEdge, ControlFlowGraph},
        dataflow::{DataFlowAnalysis, DataFlowSolver, Incoming},
        sem::{BinOp, Instruction, MemType, Reg, SemOp},
    },
    cache::AnalysisConfig,
    utils::graph::NodeId,
    Result,
};

/// Register file and memory at a program point.
///
/// Registers without an entry hold TOP.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AbstractState {
    registers: BTreeMap<Reg, Poly>,
    memory: Memory,
}

impl AbstractState {
    /// Returns the value of a register.
    #[must_use]
    pub fn register(&self, reg: Reg) -> Poly {
        self.registers.get(&reg).copied().unwrap_or(Poly::Top)
    }

    /// Sets the value of a register.
    pub fn set_register(&mut self, reg: Reg, value: Poly) {
        if value.is_top() {
            self.registers.remove(&reg);
        } else {
            self.registers.insert(reg, value);
        }
    }

    /// Returns the abstract memory.
    #[must_use]
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    fn clear_temporaries(&mut self) {
        self.registers.retain(|r, _| !r.is_temp());
    }

    fn join(&self, other: &AbstractState, polys: &PolyDomain<'_>) -> AbstractState {
        if self == other {
            return self.clone();
        }
        let registers = self
            .registers
            .iter()
            .filter_map(|(r, &v)| {
                let j = polys.join(v, *other.registers.get(r)?);
                (!j.is_top()).then_some((*r, j))
            })
            .collect();
        AbstractState {
            registers,
            memory: self.memory.join(&other.memory, polys),
        }
    }

    fn combine(&self, other: &AbstractState, mut f: impl FnMut(Poly, Poly) -> Poly) -> AbstractState {
        let mut registers = BTreeMap::new();
        for (&r, &v) in &self.registers {
            let w = other.registers.get(&r).copied().unwrap_or(Poly::Top);
            let value = f(v, w);
            if !value.is_top() {
                registers.insert(r, value);
            }
        }
        for (&r, &w) in &other.registers {
            if !self.registers.contains_key(&r) {
                let value = f(Poly::Top, w);
                if !value.is_top() {
                    registers.insert(r, value);
                }
            }
        }
        AbstractState {
            registers,
            memory: self.memory.combine(&other.memory, f),
        }
    }

    fn map(&mut self, mut f: impl FnMut(Poly) -> Poly) {
        self.registers.retain(|_, v| {
            *v = f(*v);
            !v.is_top()
        });
        self.memory.map(f);
    }
}

/// A load or store met while interpreting an instruction.
#[derive(Debug, Clone, Copy)]
pub struct MemoryOp<'i> {
    /// The accessing instruction.
    pub instruction: &'i Instruction,
    /// Load or store.
    pub kind: AccessKind,
    /// Symbolic address.
    pub address: Poly,
    /// Transfer type.
    pub ty: MemType,
}

/// Executes semantic operations on an [`AbstractState`].
pub struct Interpreter<'a, 'g> {
    polys: &'a PolyDomain<'g>,
    init: &'a InitialState,
    cap: u64,
}

impl<'a, 'g> Interpreter<'a, 'g> {
    /// Creates an interpreter; `cap` bounds the words joined by a range load.
    #[must_use]
    pub fn new(polys: &'a PolyDomain<'g>, init: &'a InitialState, cap: u64) -> Self {
        Self { polys, init, cap }
    }

    /// Builds the state at the program entry.
    #[must_use]
    pub fn entry_state(&self, stack_base: u32) -> AbstractState {
        let mut state = AbstractState::default();
        state.set_register(self.init.stack_pointer, self.polys.address(stack_base));
        for (&reg, &value) in &self.init.registers {
            state.set_register(reg, self.polys.make(value));
        }
        for (&address, &value) in &self.init.memory {
            state.memory.store(address, self.polys.make(value));
        }
        state
    }

    /// Executes every instruction of a block, reporting memory operations to
    /// `sink` in execution order.
    pub fn execute_block<'i>(
        &self,
        block: &'i BasicBlock,
        state: &mut AbstractState,
        sink: &mut impl FnMut(MemoryOp<'i>),
    ) {
        for instruction in &block.instructions {
            self.execute(instruction, state, sink);
        }
    }

    /// Executes one instruction.
    ///
    /// Operations guarded by [`SemOp::If`] run on a copy of the state that is
    /// joined with the skipping path once the guarded run ends. Temporaries are
    /// dropped afterwards.
    pub fn execute<'i>(
        &self,
        instruction: &'i Instruction,
        state: &mut AbstractState,
        sink: &mut impl FnMut(MemoryOp<'i>),
    ) {
        let mut pending: Vec<(usize, AbstractState)> = Vec::new();
        for (index, op) in instruction.ops.iter().enumerate() {
            if let SemOp::If { skip, .. } = op {
                pending.push((index + 1 + skip, state.clone()));
            } else {
                self.step(instruction, op, state, sink);
            }
            while pending.last().is_some_and(|(end, _)| *end <= index + 1) {
                if let Some((_, skipped)) = pending.pop() {
                    *state = state.join(&skipped, self.polys);
                }
            }
        }
        while let Some((_, skipped)) = pending.pop() {
            *state = state.join(&skipped, self.polys);
        }
        state.clear_temporaries();
    }

    fn step<'i>(
        &self,
        instruction: &'i Instruction,
        op: &SemOp,
        state: &mut AbstractState,
        sink: &mut impl FnMut(MemoryOp<'i>),
    ) {
        let p = self.polys;
        match *op {
            SemOp::Nop | SemOp::Branch(_) | SemOp::Trap | SemOp::Cont | SemOp::If { .. } => {}
            SemOp::Scratch(dst) => state.set_register(dst, Poly::Top),
            SemOp::Set { dst, src } => {
                let value = state.register(src);
                state.set_register(dst, value);
            }
            SemOp::SetI { dst, imm } => state.set_register(dst, p.make(imm)),
            SemOp::Unary { dst, .. } => state.set_register(dst, Poly::Top),
            SemOp::Binary { op, dst, a, b } => {
                let (a, b) = (state.register(a), state.register(b));
                let value = match op {
                    BinOp::Add => p.add(a, b),
                    BinOp::Sub => p.sub(a, b),
                    BinOp::Shl => p.shl(a, b),
                    BinOp::Mul => p.mul(a, b),
                    BinOp::Or => p.or(a, b),
                    _ => Poly::Top,
                };
                state.set_register(dst, value);
            }
            SemOp::Load { dst, addr, ty } => {
                let address = state.register(addr);
                sink(MemoryOp {
                    instruction,
                    kind: AccessKind::Load,
                    address,
                    ty,
                });
                let value = self.load(state, address, ty);
                state.set_register(dst, value);
            }
            SemOp::Store { src, addr, ty } => {
                let address = state.register(addr);
                sink(MemoryOp {
                    instruction,
                    kind: AccessKind::Store,
                    address,
                    ty,
                });
                let value = state.register(src);
                self.store(instruction, state, address, value);
            }
        }
    }

    fn load(&self, state: &AbstractState, address: Poly, ty: MemType) -> Poly {
        let Some(span) = self.polys.to_address(address) else {
            return Poly::Top;
        };
        if span.base != span.top {
            let step = self.polys.step(address);
            return state
                .memory
                .load_range(self.polys, span.base, span.top, step, self.cap);
        }
        match state.memory.get(span.base) {
            Some(value) => value,
            None if state.memory.is_pristine(span.base, ty.size()) => self
                .init
                .read(span.base, ty)
                .map_or(Poly::Top, |v| self.polys.make(v)),
            None => Poly::Top,
        }
    }

    fn store(&self, instruction: &Instruction, state: &mut AbstractState, address: Poly, value: Poly) {
        match address {
            Poly::Bottom => {}
            Poly::Top => match instruction.access_range {
                Some(range) => state
                    .memory
                    .store_range(self.polys, range.lo, range.hi, 1, value),
                None => state.memory.store_at_top(),
            },
            Poly::Expr(_) => match self.polys.to_address(address) {
                None => state.memory.store_at_top(),
                Some(span) if span.base == span.top => state.memory.store(span.base, value),
                Some(span) => {
                    let step = self.polys.step(address);
                    state
                        .memory
                        .store_range(self.polys, span.base, span.top, step, value);
                }
            },
        }
    }
}

/// Data flow instance of the interpreter.
struct ResolveAnalysis<'a, 'g> {
    interpreter: Interpreter<'a, 'g>,
    entry: AbstractState,
    /// Header inputs of the previous visit.
    previous: HashMap<NodeId, Option<AbstractState>>,
}

impl ResolveAnalysis<'_, '_> {
    fn join_states(&self, a: &Option<AbstractState>, b: &Option<AbstractState>) -> Option<AbstractState> {
        match (a, b) {
            (None, x) | (x, None) => x.clone(),
            (Some(x), Some(y)) => Some(x.join(y, self.interpreter.polys)),
        }
    }
}

/// `f` applied value-wise, BOTTOM states being neutral.
fn combine_states(
    a: &Option<AbstractState>,
    b: &Option<AbstractState>,
    f: impl FnMut(Poly, Poly) -> Poly,
) -> Option<AbstractState> {
    match (a, b) {
        (None, x) | (x, None) => x.clone(),
        (Some(x), Some(y)) => Some(x.combine(y, f)),
    }
}

impl DataFlowAnalysis for ResolveAnalysis<'_, '_> {
    type State = Option<AbstractState>;

    fn bottom(&self) -> Self::State {
        None
    }

    fn entry_state(&self) -> Self::State {
        Some(self.entry.clone())
    }

    fn join(&mut self, a: &Self::State, b: &Self::State) -> Self::State {
        self.join_states(a, b)
    }

    fn equals(&self, a: &Self::State, b: &Self::State) -> bool {
        a == b
    }

    fn input(
        &mut self,
        cfg: &ControlFlowGraph,
        block: NodeId,
        incoming: &[Incoming<'_, Self::State>],
    ) -> Self::State {
        let mut entering = None;
        let mut back = None;
        for inc in incoming {
            if inc.is_back_edge() {
                back = self.join_states(&back, inc.state);
            } else {
                entering = self.join_states(&entering, inc.state);
            }
        }
        if !cfg.is_loop_header(block) {
            return self.join_states(&entering, &back);
        }

        let polys = self.interpreter.polys;
        let previous = self.previous.get(&block).cloned().flatten();
        let widened = combine_states(&previous, &back, |p, n| polys.exwiden(block, p, n));
        let result = combine_states(&entering, &widened, |a, b| polys.exloop_join(a, b));
        self.previous.insert(block, result.clone());
        result
    }

    fn transfer(&mut self, cfg: &ControlFlowGraph, block: NodeId, input: &Self::State) -> Self::State {
        let (Some(state), Some(bb)) = (input, cfg.block(block)) else {
            return input.clone();
        };
        let mut state = state.clone();
        self.interpreter.execute_block(bb, &mut state, &mut |_| {});
        Some(state)
    }

    fn propagate(&mut self, _cfg: &ControlFlowGraph, edge: &CfgEdge, output: &Self::State) -> Self::State {
        let mut state = output.clone();
        if let Some(s) = state.as_mut() {
            let polys = self.interpreter.polys;
            for &header in edge.exited_loops() {
                s.map(|v| polys.filter(header, v));
            }
        }
        state
    }
}

/// Input states of every block after address resolution.
#[derive(Debug, Clone)]
pub struct ResolvedStates {
    inputs: Vec<Option<AbstractState>>,
    iterations: usize,
}

impl ResolvedStates {
    /// Returns the state at the start of `block`, `None` if unreachable.
    #[must_use]
    pub fn input(&self, block: NodeId) -> Option<&AbstractState> {
        self.inputs.get(block.index()).and_then(Option::as_ref)
    }

    /// Returns the number of block visits the fixed point took.
    #[must_use]
    pub const fn iterations(&self) -> usize {
        self.iterations
    }
}

/// Runs the address resolution fixed point over a graph.
///
/// # Examples
///
/// ```rust,ignore
/// use pidcache::address::{AddressResolver, InitialState, PolyDomain};
/// use pidcache::cache::AnalysisConfig;
///
/// let polys = PolyDomain::new(&cfg);
/// let config = AnalysisConfig::default();
/// let states = AddressResolver::new(&polys, &init, &config).resolve()?;
/// ```
pub struct AddressResolver<'a, 'g> {
    polys: &'a PolyDomain<'g>,
    init: &'a InitialState,
    config: &'a AnalysisConfig,
}

impl<'a, 'g> AddressResolver<'a, 'g> {
    /// Creates a resolver over the graph of `polys`.
    #[must_use]
    pub fn new(polys: &'a PolyDomain<'g>, init: &'a InitialState, config: &'a AnalysisConfig) -> Self {
        Self { polys, init, config }
    }

    /// Returns an interpreter configured like the resolver.
    #[must_use]
    pub fn interpreter(&self) -> Interpreter<'a, 'g> {
        Interpreter::new(self.polys, self.init, self.config.enumeration_cap)
    }

    /// Computes the input state of every block.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::IterationLimit`] if the fixed point exceeds the
    /// configured visit budget.
    pub fn resolve(&self) -> Result<ResolvedStates> {
        let interpreter = self.interpreter();
        let entry = interpreter.entry_state(self.config.stack_base);
        let analysis = ResolveAnalysis {
            interpreter,
            entry,
            previous: HashMap::new(),
        };
        let mut solver =
            DataFlowSolver::new(self.polys.cfg(), analysis).with_max_visits(self.config.max_visits);
        let results = solver.solve()?;
        debug!(
            "address resolution converged after {} visits, {} symbolic values",
            results.iterations,
            self.polys.arena().len()
        );
        Ok(ResolvedStates {
            inputs: results.in_states,
            iterations: results.iterations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::cfg::{CfgBuilder, LoopBound};

    const SP: Reg = Reg::Machine(13);
    const R0: Reg = Reg::Machine(0);
    const R1: Reg = Reg::Machine(1);
    const R2: Reg = Reg::Machine(2);
    const T0: Reg = Reg::Temp(0);

    fn add_imm(address: u32, reg: Reg, imm: i32) -> Instruction {
        Instruction::new(
            address,
            vec![
                SemOp::SetI { dst: T0, imm },
                SemOp::Binary {
                    op: BinOp::Add,
                    dst: reg,
                    a: reg,
                    b: T0,
                },
            ],
        )
    }

    fn load(address: u32, dst: Reg, addr: Reg) -> Instruction {
        Instruction::new(
            address,
            vec![SemOp::Load {
                dst,
                addr,
                ty: MemType::Int32,
            }],
        )
    }

    /// entry: r0 = 0x1000 ; header: r1 = [r0]; r0 += 4 ; back to header ; exit
    fn array_walk(bound: LoopBound) -> (ControlFlowGraph, [NodeId; 3]) {
        let mut b = CfgBuilder::new();
        let entry = b.add_block(BasicBlock::new(0x100).with_instruction(Instruction::new(
            0x100,
            vec![SemOp::SetI { dst: R0, imm: 0x1000 }],
        )));
        let header = b.add_block(
            BasicBlock::new(0x104)
                .with_instruction(load(0x104, R1, R0))
                .with_instruction(add_imm(0x108, R0, 4)),
        );
        let exit = b.add_block(BasicBlock::new(0x10c).with_instruction(load(0x10c, R2, R0)));
        b.add_edge(entry, header).unwrap();
        b.add_edge(header, header).unwrap();
        b.add_edge(header, exit).unwrap();
        b.set_loop_bound(header, bound);
        (b.build(entry).unwrap(), [entry, header, exit])
    }

    #[test]
    fn test_loop_carried_pointer() {
        let (cfg, [entry, header, exit]) = array_walk(LoopBound::exact(10));
        let polys = PolyDomain::new(&cfg);
        let init = InitialState::new(SP);
        let config = AnalysisConfig::default();
        let states = AddressResolver::new(&polys, &init, &config).resolve().unwrap();

        let at_entry = states.input(entry).unwrap();
        assert_eq!(at_entry.register(SP), polys.address(0x8000_0000));

        let at_header = states.input(header).unwrap();
        let expected = polys.add(polys.term(4, header), polys.make(0x1000));
        assert_eq!(at_header.register(R0), expected);

        // after the loop r0 points past the last element
        let at_exit = states.input(exit).unwrap();
        assert_eq!(at_exit.register(R0), polys.make(0x1000 + 4 * 10));
        assert!(states.iterations() >= 3);
    }

    #[test]
    fn test_unknown_bound_degrades_after_loop() {
        let (cfg, [_, header, exit]) = array_walk(LoopBound::unknown());
        let polys = PolyDomain::new(&cfg);
        let init = InitialState::new(SP);
        let config = AnalysisConfig::default();
        let states = AddressResolver::new(&polys, &init, &config).resolve().unwrap();

        assert_eq!(
            states.input(header).unwrap().register(R0),
            polys.add(polys.term(4, header), polys.make(0x1000))
        );
        assert_eq!(states.input(exit).unwrap().register(R0), Poly::Top);
    }

    #[test]
    fn test_memory_round_trip_and_image() {
        let mut b = CfgBuilder::new();
        let entry = b.add_block(BasicBlock::new(0));
        let cfg = b.build(entry).unwrap();
        let polys = PolyDomain::new(&cfg);
        let init = InitialState::new(SP)
            .with_register(R0, 0x2000)
            .unwrap()
            .with_segment(0x3000, vec![0x00, 0x40, 0x00, 0x00]);
        let interpreter = Interpreter::new(&polys, &init, 64);
        let mut state = interpreter.entry_state(0x8000_0000);

        let store = Instruction::new(
            0x10,
            vec![SemOp::Store {
                src: SP,
                addr: R0,
                ty: MemType::Int32,
            }],
        );
        let mut seen = Vec::new();
        interpreter.execute(&store, &mut state, &mut |op| seen.push((op.kind, op.address)));
        interpreter.execute(&load(0x14, R1, R0), &mut state, &mut |op| {
            seen.push((op.kind, op.address))
        });
        assert_eq!(state.register(R1), polys.address(0x8000_0000));
        assert_eq!(
            seen,
            vec![
                (AccessKind::Store, polys.make(0x2000)),
                (AccessKind::Load, polys.make(0x2000)),
            ]
        );

        let set = Instruction::new(0x18, vec![SemOp::SetI { dst: R2, imm: 0x3000 }]);
        interpreter.execute(&set, &mut state, &mut |_| {});
        interpreter.execute(&load(0x1c, R1, R2), &mut state, &mut |_| {});
        assert_eq!(state.register(R1), polys.make(0x4000));
    }

    #[test]
    fn test_top_store_and_guarded_ops() {
        let mut b = CfgBuilder::new();
        let entry = b.add_block(BasicBlock::new(0));
        let cfg = b.build(entry).unwrap();
        let polys = PolyDomain::new(&cfg);
        let init = InitialState::new(SP)
            .with_word(0x2000, 5)
            .with_segment(0x3000, vec![1, 0, 0, 0]);
        let interpreter = Interpreter::new(&polys, &init, 64);
        let mut state = interpreter.entry_state(0x8000_0000);
        assert_eq!(state.memory().get(0x2000), Some(polys.make(5)));

        // if (c) r0 = 8 ; r0 is 8 or unknown afterwards
        let guarded = Instruction::new(
            0x10,
            vec![
                SemOp::SetI { dst: R0, imm: 4 },
                SemOp::If { cond: R1, skip: 1 },
                SemOp::SetI { dst: R0, imm: 8 },
                SemOp::Binary {
                    op: BinOp::Cmp,
                    dst: T0,
                    a: R0,
                    b: R0,
                },
            ],
        );
        interpreter.execute(&guarded, &mut state, &mut |_| {});
        assert_eq!(state.register(R0), Poly::Top);
        assert_eq!(state.register(T0), Poly::Top);

        let wild = Instruction::new(
            0x14,
            vec![SemOp::Store {
                src: R0,
                addr: R1,
                ty: MemType::Int32,
            }],
        );
        interpreter.execute(&wild, &mut state, &mut |_| {});
        assert!(state.memory().is_empty());
        let set = Instruction::new(0x18, vec![SemOp::SetI { dst: R2, imm: 0x3000 }]);
        interpreter.execute(&set, &mut state, &mut |_| {});
        interpreter.execute(&load(0x1c, R1, R2), &mut state, &mut |_| {});
        assert_eq!(state.register(R1), Poly::Top);
    }
}
