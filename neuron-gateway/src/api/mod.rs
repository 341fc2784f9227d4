//! Small helpers backing the non-`/v1` introspection endpoints (§6, §12).

pub mod logs;
