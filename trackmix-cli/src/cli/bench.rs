use clap::ArgMatches;

use crate::error::RunError;

/// Run the benchmark when `--bench` is given, returning its exit code.
pub fn maybe_run_bench(args: &ArgMatches) -> Result<Option<i32>, RunError> {
    if !args.get_flag("bench") {
        return Ok(None);
    }
    run_bench(args).map(Some)
}

fn run_bench(_args: &ArgMatches) -> Result<i32, RunError> {
    #[cfg(not(feature = "bench"))]
    {
        eprintln!("Benchmarking requires the `bench` feature.");
        Ok(1)
    }
    #[cfg(feature = "bench")]
    {
        use trackmix_lib::diagnostics::bench::{bench_mixer, MixerBenchConfig};

        let args = _args;
        let defaults = MixerBenchConfig::default();
        let config = MixerBenchConfig {
            tracks: args.get_one::<usize>("bench-tracks").copied().unwrap_or(defaults.tracks),
            resampled_tracks: args
                .get_one::<usize>("bench-resampled")
                .copied()
                .unwrap_or(defaults.resampled_tracks),
            frame_count: args
                .get_one::<usize>("bench-frames")
                .copied()
                .unwrap_or(defaults.frame_count),
            iterations: args
                .get_one::<usize>("bench-iterations")
                .copied()
                .unwrap_or(defaults.iterations),
            ..defaults
        };

        let result = bench_mixer(config)?;
        println!(
            "Mixer bench (tracks={} resampled={} frames={} iters={}): avg {:.4}ms (min {:.4}ms max {:.4}ms), block {:.2}ms, rt {:.4}x",
            config.tracks,
            config.resampled_tracks,
            config.frame_count,
            config.iterations,
            result.avg_ms,
            result.min_ms,
            result.max_ms,
            result.block_time_ms,
            result.rt_factor
        );
        Ok(0)
    }
}
