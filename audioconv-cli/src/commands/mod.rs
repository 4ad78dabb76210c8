pub mod config_args;
pub mod init;
pub mod status;
pub mod sync;
pub mod watch;
