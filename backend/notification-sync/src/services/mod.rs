/// Sync engine components
pub mod connection_state;
pub mod delivery;
pub mod engine;
pub mod fallback_poller;
pub mod reconciliation;
pub mod subscription;

pub use connection_state::{ConnectionState, FallbackDirective, InvalidTransition, Transition};
pub use delivery::{AlertError, AudioAlert, DeliveryEffectTrigger, TerminalBell};
pub use engine::{EngineConfig, EngineDeps, EngineHandle, EngineStatus, NotificationEngine};
pub use fallback_poller::FallbackPoller;
pub use reconciliation::{MutationUndo, ReadState, ReconciliationStore};
pub use subscription::{channel_key, ChannelOutcome, SubscriptionManager};
