pub mod dump;
pub mod free_port;
pub mod introspect;
pub mod restore;
pub mod up;
