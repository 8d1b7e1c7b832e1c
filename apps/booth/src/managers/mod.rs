pub mod studio_manager;
pub mod upload_manager;
