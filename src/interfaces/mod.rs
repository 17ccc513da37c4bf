pub mod authorizer;
pub mod event_sink;
