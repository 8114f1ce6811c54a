pub mod bufferpool;
pub mod parallel;
pub mod replacer;

pub use self::bufferpool::BufferPoolInstance;
pub use self::parallel::ParallelBufferPool;
pub use self::replacer::{new_replacer, ClockReplacer, LruReplacer, Replacer, ReplacerType};
