pub mod pocketbase;

pub use pocketbase::PocketBaseAdapter;
