mod analyzer;
mod process;
