pub mod ner;
pub mod normalize;
pub mod segmenter;
