pub mod commands;
pub mod repl;

pub use commands::{parse_line, ReplCommand};
pub use repl::{run_repl, ActiveTurn, ChatSession, Interrupts, StreamRenderer};
