pub mod app_router;
pub mod extract;
pub mod handlers;

pub use app_router::AppRouter;
