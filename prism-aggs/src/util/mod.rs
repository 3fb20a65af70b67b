mod ordered_queue;
mod sequential_bits;

pub use ordered_queue::OrderedQueue;
pub use sequential_bits::SequentialBits;
