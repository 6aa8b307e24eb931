// Library exports

pub mod middleware;
pub mod session;

pub use middleware::{session_middleware, SessionHandle};
pub use session::{
    MemorySessionStorage, Session, SessionConfig, SessionError, SessionManager,
    SessionManagerState, SessionStorage, StorageError,
};
