use rust_embed::RustEmbed;

/// The single-page board, compiled into the binary.
#[derive(RustEmbed)]
#[folder = "$CARGO_MANIFEST_DIR/ui/"]
pub struct Assets;
