//! Health checks: resolution, execution and output parsing

pub mod exec;
pub mod parse;
pub mod resolve;

pub use exec::{execute, ExecError, ExecOutput, ExecRequest};
pub use parse::{parse_output, ParseError, ParsedOutput};
pub use resolve::{file_sha256, resolve, verify_pin, CheckScheme, ResolveError, ResolvedCheck};
