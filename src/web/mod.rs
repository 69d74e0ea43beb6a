pub mod auth;
pub mod csrf;
pub mod data;
pub mod detect;
pub mod landing;
pub mod models;
pub mod profile;
pub mod responses;
pub mod router;
pub mod session;
pub mod state;
pub mod storage;
pub mod templates;
pub mod tokens;
pub mod uploads;

pub use state::AppState;
pub use templates::escape_html;
