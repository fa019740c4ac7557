/// Rayon pool sizing for row normalization
use tracing::debug;

/// Install the global pool with `threads` workers (0 = one per CPU) and
/// return the worker count in effect. A pool installed earlier in the
/// process is kept as is.
pub fn init_normalization_pool(threads: usize) -> usize {
    let wanted = match threads {
        0 => num_cpus::get(),
        n => n,
    };
    let installed = rayon::ThreadPoolBuilder::new()
        .num_threads(wanted)
        .thread_name(|index| format!("normalize-{}", index))
        .build_global();
    if let Err(err) = installed {
        debug!(error = %err, "Keeping the existing global pool");
    }
    rayon::current_num_threads()
}
