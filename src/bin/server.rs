//! RAG relay server binary.
//! Run with: cargo run --bin rag-relay-server

use std::process::ExitCode;

use rag_relay::start_rag_relay;

fn main() -> ExitCode {
    start_rag_relay::run()
}
