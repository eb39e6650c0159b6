/// Embedded HLSL used by the capture and preview stages.
///
/// - `SRGB_TO_LINEAR_BLIT_HLSL`: compute kernel that converts one output's
///   8-bit sRGB sub-rectangle to linear scRGB while placing it in the
///   virtual-desktop composite.
/// - `OVERLAY_QUAD_HLSL`: fullscreen-triangle vertex shader plus identity
///   pixel shader used by the preview swap chain.
pub const SRGB_TO_LINEAR_BLIT_HLSL: &str = include_str!("shader/srgb_to_linear_blit.hlsl");
pub const OVERLAY_QUAD_HLSL: &str = include_str!("shader/overlay_quad.hlsl");
