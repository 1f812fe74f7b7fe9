//! Shared utility functions for exercise-forge.
//!
//! This module provides common utilities used across multiple modules,
//! including JSON extraction from LLM responses.

pub mod json_extraction;

pub use json_extraction::{
    analyze_json_structure, extract_from_generic_code_block, extract_from_json_code_block,
    find_matching_brace, locate_json_objects, outermost_objects, repair_json,
    strip_wrapping_markers, JsonExtractionError, JsonStructureAnalysis,
};
