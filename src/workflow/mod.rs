pub mod controller;
pub mod session;

pub use crate::models::PhaseKind;
pub use controller::{SessionController, Wake};
pub use session::{Phase, ReceiptStep, Session};
