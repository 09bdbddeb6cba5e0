// nfviz/server/src/web/handlers/mod.rs

pub mod execute_handlers;
pub mod status_handlers;
