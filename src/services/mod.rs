pub mod auth_service;
pub mod drive_service;
pub mod letter_service;

pub use drive_service::DriveClient;
pub use letter_service::LetterService;
