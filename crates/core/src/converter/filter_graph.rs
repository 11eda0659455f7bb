//! Filter graph construction.
//!
//! The graph is built as an ordered list of [`FilterStage`]s and only turned
//! into ffmpeg `-filter_complex` syntax by [`FilterGraph::to_filter_complex`].

use serde::{Deserialize, Serialize};

use super::types::{AssetKind, ConversionSettings, DitherMode, MAX_PALETTE_SIZE};

/// palettegen refuses fewer than four colors.
const PALETTEGEN_MIN_COLORS: u16 = 4;

/// One transform applied by the external tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum FilterStage {
    /// Divide both dimensions by `grid` (minimum 1px), nearest-neighbor.
    Downscale { grid: u32 },
    /// Multiply both dimensions by `factor`, nearest-neighbor.
    Upscale { factor: u32 },
    /// Snap alpha to fully transparent below `threshold`, fully opaque otherwise.
    AlphaThreshold { threshold: u8 },
    /// Darken the edges between blocks.
    Outline,
    /// Crop to even width and height.
    EvenCrop,
    /// Resample to a constant frame rate.
    FrameRate { fps: u32 },
    /// Pad to even width and height.
    EvenPad,
    /// Reduce to at most `colors` entries (one reserved for transparency).
    Palette { colors: u16, dither: DitherMode },
}

impl FilterStage {
    /// Renders a linear stage. Branching stages are handled by the graph.
    fn linear_filter(&self) -> Option<String> {
        match *self {
            Self::Downscale { grid } => Some(format!(
                "scale=w='max(1,trunc(iw/{g}))':h='max(1,trunc(ih/{g}))':flags=neighbor",
                g = grid
            )),
            Self::Upscale { factor } => Some(format!(
                "scale=w=iw*{f}:h=ih*{f}:flags=neighbor",
                f = factor
            )),
            Self::AlphaThreshold { threshold } => Some(format!(
                "format=rgba,lut=a='if(lt(val,{}),0,255)'",
                threshold
            )),
            Self::EvenCrop => Some("crop=w=trunc(iw/2)*2:h=trunc(ih/2)*2".to_string()),
            Self::FrameRate { fps } => Some(format!("fps={}", fps)),
            Self::EvenPad => Some("pad=w=ceil(iw/2)*2:h=ceil(ih/2)*2".to_string()),
            Self::Outline | Self::Palette { .. } => None,
        }
    }
}

/// Ordered list of stages for one conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterGraph {
    stages: Vec<FilterStage>,
}

impl FilterGraph {
    /// Stages in application order.
    pub fn stages(&self) -> &[FilterStage] {
        &self.stages
    }

    /// Whether a palette reduction stage is present.
    pub fn has_palette(&self) -> bool {
        self.stages
            .iter()
            .any(|s| matches!(s, FilterStage::Palette { .. }))
    }

    /// Serializes the graph into ffmpeg `-filter_complex` syntax.
    pub fn to_filter_complex(&self) -> String {
        let mut graph = String::new();
        let mut chain: Vec<String> = Vec::new();

        for stage in &self.stages {
            if let Some(filter) = stage.linear_filter() {
                chain.push(filter);
                continue;
            }
            match *stage {
                FilterStage::Outline => {
                    chain.push("split[ol_src][ol_edge]".to_string());
                    flush(&mut graph, &mut chain);
                    graph.push_str(
                        ";[ol_edge]format=rgba,edgedetect=low=0.1:high=0.3:mode=colormix,negate[ol_mask]",
                    );
                    graph.push_str(";[ol_src][ol_mask]blend=all_mode=multiply");
                }
                FilterStage::Palette { colors, dither } => {
                    chain.push("split[pal_src][pal_gen]".to_string());
                    flush(&mut graph, &mut chain);
                    graph.push_str(&format!(
                        ";[pal_gen]palettegen=max_colors={}:reserve_transparent=1[pal]",
                        colors.max(PALETTEGEN_MIN_COLORS)
                    ));
                    graph.push_str(&format!(
                        ";[pal_src][pal]paletteuse=dither={}",
                        dither.ffmpeg_name()
                    ));
                }
                _ => {}
            }
        }
        flush(&mut graph, &mut chain);
        graph
    }
}

/// Appends pending linear filters to the current chain of `graph`.
fn flush(graph: &mut String, chain: &mut Vec<String>) {
    if chain.is_empty() {
        return;
    }
    if !graph.is_empty() && !graph.ends_with(';') {
        graph.push(',');
    }
    graph.push_str(&chain.join(","));
    chain.clear();
}

/// Builds the filter graph for an asset.
///
/// Never fails: every knob is clamped before the stages are derived.
pub fn build_filter_graph(kind: AssetKind, settings: &ConversionSettings) -> FilterGraph {
    let settings = settings.clamped();
    let is_video = kind == AssetKind::Video;
    let mut stages = vec![FilterStage::Downscale {
        grid: settings.grid_size,
    }];

    if settings.upscale > 1 {
        stages.push(FilterStage::Upscale {
            factor: settings.upscale,
        });
    }

    if settings.alpha_threshold > 0 {
        stages.push(FilterStage::AlphaThreshold {
            threshold: settings.alpha_threshold,
        });
    }

    if settings.outline {
        stages.push(FilterStage::Outline);
    }

    // Encoders need even dimensions for video.
    if settings.trim || is_video {
        stages.push(FilterStage::EvenCrop);
    }

    if is_video {
        stages.push(FilterStage::FrameRate {
            fps: settings.frame_rate,
        });
        stages.push(FilterStage::EvenPad);
    }

    if settings.palette_size < MAX_PALETTE_SIZE {
        stages.push(FilterStage::Palette {
            colors: settings.palette_size,
            dither: settings.dither,
        });
    }

    FilterGraph { stages }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(grid: u32, palette: u16, upscale: u32) -> ConversionSettings {
        ConversionSettings {
            grid_size: grid,
            palette_size: palette,
            upscale,
            ..Default::default()
        }
    }

    #[test]
    fn test_full_palette_skips_reduction() {
        let graph = build_filter_graph(AssetKind::Image, &settings(16, 256, 4));

        assert_eq!(
            graph.stages(),
            &[
                FilterStage::Downscale { grid: 16 },
                FilterStage::Upscale { factor: 4 },
            ]
        );
        assert!(!graph.has_palette());

        let rendered = graph.to_filter_complex();
        assert!(rendered.contains("trunc(iw/16)"));
        assert!(rendered.contains("iw*4"));
        assert!(!rendered.contains("palettegen"));
    }

    #[test]
    fn test_stage_order_for_video() {
        let config = ConversionSettings {
            grid_size: 4,
            palette_size: 16,
            upscale: 2,
            alpha_threshold: 128,
            frame_rate: 10,
            dither: DitherMode::Ordered,
            ..Default::default()
        };
        let graph = build_filter_graph(AssetKind::Video, &config);

        assert_eq!(
            graph.stages(),
            &[
                FilterStage::Downscale { grid: 4 },
                FilterStage::Upscale { factor: 2 },
                FilterStage::AlphaThreshold { threshold: 128 },
                FilterStage::EvenCrop,
                FilterStage::FrameRate { fps: 10 },
                FilterStage::EvenPad,
                FilterStage::Palette {
                    colors: 16,
                    dither: DitherMode::Ordered
                },
            ]
        );
    }

    #[test]
    fn test_image_without_trim_has_no_crop() {
        let graph = build_filter_graph(AssetKind::Image, &settings(8, 32, 1));
        assert!(!graph.stages().contains(&FilterStage::EvenCrop));

        let trimmed = ConversionSettings {
            trim: true,
            ..settings(8, 32, 1)
        };
        let graph = build_filter_graph(AssetKind::Image, &trimmed);
        assert!(graph.stages().contains(&FilterStage::EvenCrop));
        assert!(!graph
            .stages()
            .iter()
            .any(|s| matches!(s, FilterStage::FrameRate { .. })));
    }

    #[test]
    fn test_pathological_settings_are_clamped() {
        let config = ConversionSettings {
            grid_size: 0,
            palette_size: 0,
            upscale: 1000,
            frame_rate: 10_000,
            ..Default::default()
        };
        let graph = build_filter_graph(AssetKind::Video, &config);

        assert_eq!(graph.stages()[0], FilterStage::Downscale { grid: 1 });
        assert_eq!(graph.stages()[1], FilterStage::Upscale { factor: 16 });
        assert!(graph.stages().contains(&FilterStage::FrameRate { fps: 120 }));
        assert!(graph.stages().contains(&FilterStage::Palette {
            colors: 2,
            dither: DitherMode::None
        }));
    }

    #[test]
    fn test_palette_serialization() {
        let config = ConversionSettings {
            palette_size: 16,
            dither: DitherMode::ErrorDiffusion,
            ..Default::default()
        };
        let rendered = build_filter_graph(AssetKind::Image, &config).to_filter_complex();

        assert!(rendered.contains("split[pal_src][pal_gen]"));
        assert!(rendered.contains("[pal_gen]palettegen=max_colors=16:reserve_transparent=1[pal]"));
        assert!(rendered.ends_with("[pal_src][pal]paletteuse=dither=floyd_steinberg"));
    }

    #[test]
    fn test_small_palette_respects_palettegen_minimum() {
        let config = ConversionSettings {
            palette_size: 2,
            ..Default::default()
        };
        let graph = build_filter_graph(AssetKind::Image, &config);
        assert!(graph
            .stages()
            .iter()
            .any(|s| matches!(s, FilterStage::Palette { colors: 2, .. })));
        assert!(graph.to_filter_complex().contains("max_colors=4"));
    }

    #[test]
    fn test_outline_branch_rejoins_chain() {
        let config = ConversionSettings {
            outline: true,
            trim: true,
            palette_size: 256,
            ..Default::default()
        };
        let graph = build_filter_graph(AssetKind::Image, &config);
        assert!(graph.stages().contains(&FilterStage::Outline));

        let rendered = graph.to_filter_complex();
        assert!(rendered.contains("split[ol_src][ol_edge];[ol_edge]"));
        assert!(rendered.contains("[ol_src][ol_mask]blend=all_mode=multiply,crop="));
    }
}
