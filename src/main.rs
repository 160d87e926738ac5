/*!
 * Bounded Worker
 *
 * Worker process for exec-launched jobs: reads one job request on stdin,
 * runs it and writes one result envelope on stdout.
 */

use bounded_exec::{init_tracing, serve, JobRegistry};

fn main() -> miette::Result<()> {
    init_tracing("warn");

    let registry = JobRegistry::with_builtins();
    serve(&registry)?;
    Ok(())
}
