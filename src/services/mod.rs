pub(crate) mod aggregation;
pub(crate) mod ai_grading;
pub(crate) mod datalab_ocr;
pub(crate) mod feedback;
pub(crate) mod grading;
pub(crate) mod paper_checking;
pub(crate) mod rubric;
pub(crate) mod segmentation;
pub(crate) mod storage;
pub(crate) mod text_extraction;
