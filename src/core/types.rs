/*!
 * Core Types
 * Common types shared by the progress and memory subsystems
 */

use serde_json::Value;
use std::collections::HashMap;

/// Process ID type
pub type Pid = u32;

/// Byte count for memory readings and limits
pub type Bytes = u64;

/// Step counter for progress tracking
pub type Step = u64;

/// Free-form metrics / context map
pub type Metadata = HashMap<String, Value>;

/// Common result type for core operations
pub type CoreResult<T> = Result<T, super::errors::CoreError>;

pub const KIB: Bytes = 1024;
pub const MIB: Bytes = 1024 * KIB;
pub const GIB: Bytes = 1024 * MIB;

/// Render a byte count with a binary unit suffix (e.g. `12.5 MB`)
pub fn format_bytes(bytes: Bytes) -> String {
    let value = bytes as f64;
    if bytes >= GIB {
        format!("{:.2} GB", value / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MB", value / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KB", value / KIB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Render a signed byte delta (e.g. `+4.0 MB`, `-512 B`)
pub fn format_byte_delta(delta: i64) -> String {
    let sign = if delta < 0 { "-" } else { "+" };
    format!("{}{}", sign, format_bytes(delta.unsigned_abs()))
}
