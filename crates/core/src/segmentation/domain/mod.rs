pub mod segmenter;
