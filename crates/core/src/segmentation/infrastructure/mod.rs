pub mod yolo_segmenter;
