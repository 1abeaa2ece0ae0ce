//! Http protocol supports.
