/// Identifies a connection stream for logging purposes.
pub trait UniqueID {
    fn id(&self) -> i32;
}
