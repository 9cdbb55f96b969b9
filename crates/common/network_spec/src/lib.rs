pub mod cli;
pub mod fork_name;
pub mod networks;
