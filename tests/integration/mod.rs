//! Integration tests for quadrant planning and generation orchestration

mod test_utils;

mod crash_resume;
mod planners;
mod queue_lifecycle;
mod service_api;
mod template_codec;
