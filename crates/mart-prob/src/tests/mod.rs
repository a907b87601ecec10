mod engine;
mod soundness;
