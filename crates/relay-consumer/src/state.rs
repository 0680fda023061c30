/// Consumer lifecycle. Transitions are strictly forward:
/// `Uninitialized -> Initialized -> Consuming -> Destroying -> Destroyed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Uninitialized,
    Initialized,
    Consuming,
    Destroying,
    Destroyed,
}
