pub mod backend;
pub mod ctx;
pub mod events;
pub mod ids;
pub mod message;
pub mod policy;

pub use backend::Backend;
pub use ctx::WorkerCtx;
pub use events::UniqueEvent;
pub use ids::Jid;
pub use message::JobMessage;
pub use policy::{Across, UnlockPolicy};
