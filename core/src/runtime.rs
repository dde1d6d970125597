use rayon::ThreadPoolBuilder;
use std::env;
use std::sync::OnceLock;

static GLOBAL_POOL: OnceLock<Result<usize, String>> = OnceLock::new();

/// Overrides the global pool size when no explicit count is given.
pub const THREADS_ENV: &str = "PANO_CPU_THREADS";

/// Initialize the global Rayon thread pool used by CPU-parallel routines.
///
/// Only the first call builds the pool; later calls return its outcome
/// whatever their argument. The size is `num_threads`, else
/// `PANO_CPU_THREADS`, else the Rayon default.
pub fn init_global_thread_pool(num_threads: Option<usize>) -> Result<(), String> {
    GLOBAL_POOL
        .get_or_init(|| {
            let requested = match num_threads {
                Some(n) => Some(n),
                None => parse_thread_count(env::var(THREADS_ENV).ok().as_deref())?,
            };
            let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("pano-cpu-{i}"));
            if let Some(n) = requested {
                if n == 0 {
                    return Err(format!("{THREADS_ENV} must be >= 1"));
                }
                builder = builder.num_threads(n);
            }
            builder.build_global().map_err(|e| e.to_string())?;
            Ok(rayon::current_num_threads())
        })
        .clone()
        .map(|_| ())
}

pub fn current_cpu_threads() -> usize {
    rayon::current_num_threads()
}

fn parse_thread_count(raw: Option<&str>) -> Result<Option<usize>, String> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    match raw.parse::<usize>() {
        Ok(0) => Err(format!("{THREADS_ENV} must be >= 1")),
        Ok(n) => Ok(Some(n)),
        Err(_) => Err(format!("{THREADS_ENV} must be a positive integer, got '{raw}'")),
    }
}
