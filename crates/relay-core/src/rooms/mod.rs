//! Room membership

mod manager;

pub use manager::RoomManager;
