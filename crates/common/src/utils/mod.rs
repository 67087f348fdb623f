mod id;

pub use id::generate_session_id;
