pub mod yolo_detector;
