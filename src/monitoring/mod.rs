/*!
 * Monitoring
 * Logging setup and pipeline tracing spans
 */

mod tracer;

pub use tracer::{generate_trace_id, init_tracing, span_stage, StageSpan, SLOW_STAGE};
