//! Built-in tools

mod glob_tool;
mod grep;
mod list_dir;
mod read_file;
mod shell;
mod write_file;

pub use glob_tool::GlobTool;
pub use grep::GrepTool;
pub use list_dir::ListDirTool;
pub use read_file::ReadFileTool;
pub use shell::ShellTool;
pub use write_file::WriteFileTool;
