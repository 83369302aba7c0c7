//! Route handlers

pub mod analyses;
pub mod videos;
