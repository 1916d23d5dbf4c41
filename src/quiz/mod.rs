pub mod gateway;
pub mod registry;
pub mod room;
pub mod scoring;
mod server;
mod signaling;
pub mod store;
pub use server::QuizServer;
pub use signaling::{ClientMessage, QuizSignalingHandler, ServerMessage};
