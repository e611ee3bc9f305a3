pub mod compression;
pub mod local_fs;
pub mod vfs;
