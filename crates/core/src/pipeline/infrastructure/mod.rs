pub mod file_image_source;
