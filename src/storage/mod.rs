pub mod shared_dir;

pub use shared_dir::SharedDir;
