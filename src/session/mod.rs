pub mod persistence;
pub mod store;

pub use self::persistence::{ PersistencePolicy, SaveOutcome };
pub use self::store::{ SessionError, SessionStore };
