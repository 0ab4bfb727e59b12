//! Platform independent UI layer: observable state, view tree, widgets and
//! navigation.

pub mod host;
pub mod message;
pub mod nav;
pub mod slider;
pub mod state;
pub mod switch;
pub mod theme;
pub mod view;

pub use message::Message;
pub use view::Node;
