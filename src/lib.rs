pub mod config;
pub mod conn;
pub mod controller;
pub mod history;
pub mod i18n;
pub mod markup;
pub mod transcript;
pub mod ui;
pub mod wire;

pub use config::ChatConfig;
pub use conn::{Connection, ConnectionState};
pub use controller::ChatController;
pub use transcript::{Message, Role};
