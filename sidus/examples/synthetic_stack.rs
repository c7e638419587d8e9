//! Stack a synthetic star field observed through small drifts and rotations.
//!
//! ```text
//! cargo run -p sidus --example synthetic_stack --features synthetic
//! ```

use anyhow::Result;
use glam::DVec2;

use sidus::testing::{StarField, StarFieldConfig};
use sidus::{
    CombineMethod, Config, FrameSource, Pipeline, Progress, ReferenceSelection, SharedFn,
    Transform, VecSource,
};

const FRAME_COUNT: usize = 12;

fn main() -> Result<()> {
    common::setup_logging("info")?;

    let field = StarField::generate(&StarFieldConfig {
        width: 512,
        height: 512,
        star_count: 80,
        ..Default::default()
    });

    let center = DVec2::new(255.5, 255.5);
    let mut frames: Vec<_> = (0..FRAME_COUNT)
        .map(|i| {
            let t = i as f64;
            let drift = Transform::translation(DVec2::new(0.8 * t, -0.45 * t));
            let rotation = Transform::rotation_around(center, 0.0015 * t);
            field.frame(&drift.compose(&rotation), i as u64, &format!("light_{i:03}"))
        })
        .collect();
    // A frame knocked far off target by a bumped mount.
    frames[7] = field.frame(
        &Transform::translation(DVec2::new(260.0, 40.0)),
        7,
        "light_007",
    );

    let config = Config::from_yaml(
        "stack:\n  method: sigmaclip\n  kappa: 3.0\nalign:\n  edge_crop: true\n",
    )?;
    debug_assert_eq!(config.stack.method, CombineMethod::SigmaClip);

    let pipeline = Pipeline::new(config)?.with_progress(SharedFn::from_fn(|p: Progress| {
        tracing::debug!(
            stage = %p.stage,
            done = p.frames_processed,
            total = p.frames_total,
            "progress"
        );
    }));

    let mut source = VecSource::new(frames);
    tracing::info!(frames = source.len(), "Stacking synthetic frames");
    let output = pipeline.run(&mut source, ReferenceSelection::HighestQuality)?;

    println!("{}", serde_yml::to_string(&output.report)?);
    println!(
        "stacked {} of {} frames into {}; crop {:?}; total exposure {:.0}s",
        output.folded_count(),
        output.report.len(),
        output.image.dimensions,
        output.image.crop,
        output.metadata.total_exposure,
    );

    Ok(())
}
