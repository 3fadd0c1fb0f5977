/// One entry in the in-progress install map: the mutable working
/// representation `install_wheel`'s steps rewrite in place, before it is
/// frozen into an [`ocipack_layer::LayerFs`] at step 15.
#[derive(Debug, Clone)]
pub struct StagedFile {
    pub body: Vec<u8>,
    /// Permission bits only; file type is carried separately (`is_dir`,
    /// `link_target`) since a wheel never stores hard links.
    pub mode: u32,
    pub mtime: i64,
    pub link_target: Option<String>,
    pub is_dir: bool,
}
