pub mod cpu;
pub mod scripted;

pub use cpu::CpuPipeline;
pub use scripted::ScriptedPipeline;
