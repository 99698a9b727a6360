//! File I/O for the alignment pipeline
//!
//! Supports:
//! - PCD (Point Cloud Data - PCL format), ascii and binary
//! - Template lists (one point-cloud path per line)
//! - Plain-text 4x4 transform matrices

pub mod matrix;
pub mod pcd;
pub mod template_list;

pub use matrix::{load_matrix, parse_matrix, save_matrix, write_matrix};
pub use pcd::{load_pcd, read_pcd, read_pcd_header, save_pcd, write_pcd, PcdData, PcdHeader};
pub use template_list::{parse_template_list, read_template_list};

pub use cv_core::{Error, Result};
