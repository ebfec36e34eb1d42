pub mod image_source;
pub mod work_unit_result;
