pub mod navigation;
