pub mod fleet;
pub mod flight;
pub mod route;

/// The [`StateMachine`] trait provides calling semantics and indicates the upholding of invariants
/// that guarantee deterministic behavior.
///
/// # Functionality
/// State machines operate on defined inputs and outputs. There are usually several kinds of each,
/// represented by an enum per direction. The [`Input`](StateMachine::Input) and
/// [`Output`](StateMachine::Output) associated types name those groupings, and
/// [`process_input`](StateMachine::process_input) / [`poll_output`](StateMachine::poll_output)
/// map them onto the inherent methods of the machine. Keeping the dispatch here lets the machine
/// itself stay focused on its logic.
///
/// # Invariants
/// A [`StateMachine`] must be pure: its behavior may not depend on anything outside of the inputs
/// it has been given. Implementors *must* uphold all of the following.
///
/// ## No Interior Mutability
/// All data is either immutable or mutated through `&mut` access only. No [`std::cell`] like
/// containers, no [`std::sync`] locks, and no reference counted pointers.
///
/// ## No IO
/// No sockets, files or terminals. The drone runner owns the connection and feeds records in.
///
/// ### No System Time
/// Reading [`std::time::Instant::now`] or [`std::time::SystemTime`] makes two otherwise identical
/// runs diverge. Elapsed time is provided as input instead, e.g. one
/// [`FlightInput::Tick`](flight::FlightInput::Tick) per simulation step.
///
/// ### No System RNG
/// Randomness, when needed, must be seeded through input.
///
/// ## No Concurrency
/// No threads and no async. The machine is driven by whoever holds `&mut` to it.
///
/// ## No Blocking
/// Inputs are processed to completion without waiting on anything.
///
/// # Side Effects
/// Logging through `tracing` is allowed as long as the logic never depends on its outcome.
///
/// # Handling Time via Injection
/// A runner wraps the pure machine, performs the impure work (sleeping until the next tick,
/// reading the socket), and passes the results in as [`Input`](StateMachine::Input). This keeps
/// the machine replayable in tests: a test can push a thousand ticks through
/// [`FlightMachine`](flight::FlightMachine) in microseconds and check exactly where the drone
/// ended up.
///
/// # Example
/// ```
/// use skymesh::state_machine::StateMachine;
///
/// struct Counter {
///     total: u32,
///     pending: bool,
/// }
///
/// enum CounterInput {
///     Add(u32),
/// }
///
/// impl StateMachine for Counter {
///     type Input = CounterInput;
///     type Output = u32;
///
///     fn process_input(&mut self, input: Self::Input) {
///         match input {
///             CounterInput::Add(n) => {
///                 self.total += n;
///                 self.pending = true;
///             }
///         }
///     }
///
///     fn poll_output(&mut self) -> Option<Self::Output> {
///         std::mem::take(&mut self.pending).then_some(self.total)
///     }
/// }
///
/// let mut counter = Counter { total: 0, pending: false };
/// counter.process_input(CounterInput::Add(2));
/// counter.process_input(CounterInput::Add(3));
/// assert_eq!(counter.poll_output(), Some(5));
/// assert_eq!(counter.poll_output(), None);
/// ```
pub trait StateMachine {
    /// The type of input that is [processed](StateMachine::process_input) by the state machine.
    type Input;
    /// The type of output that is [polled](StateMachine::poll_output) by the state machine.
    type Output;

    /// Process the provided `input` into the state machine.
    fn process_input(&mut self, input: Self::Input);

    /// Poll the state machine for output, returning the first available output if present.
    ///
    /// Callers are expected to drain outputs until `None` after each input.
    fn poll_output(&mut self) -> Option<Self::Output>;
}
