//! A small line-oriented Unix shell.
//!
//! Each input line is split into pipeline stages at unquoted `|`, every stage
//! is tokenized into words, `<`/`>` redirections and a `&` background marker,
//! arguments are wildcard-expanded, and the result is run either in-process
//! (builtins, `cd`, `pwd`, `exit`) or as a process group of external programs
//! connected by pipes.
//!
//! The shell does not hand the terminal to its children. Interrupt, stop and
//! quit signals it receives are forwarded to the process group it is waiting
//! on, see [`job_control`].
//!
//! The main entry point is [`Interpreter`], fed by a
//! [`LineSource`](io_adapters::LineSource).

mod builtin;
pub mod command;
pub mod expand;
mod interpreter;
pub mod io_adapters;
pub mod job_control;
pub mod lexer;
pub mod parser;
mod process;
pub mod registry;

pub use interpreter::{Flow, Interpreter};
