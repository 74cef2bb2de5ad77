use clap::{Parser, Subcommand};
use log::debug;
use roost_kernel::{kernel, mutex, semaphore, KernelError, MutexAttrs, Timeout};
use std::error::Error;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hammer a shared mutex and a bounded semaphore from many threads
    Stress {
        /// Number of worker threads
        #[arg(long, default_value_t = 4)]
        threads: usize,

        /// Critical sections per thread
        #[arg(long, default_value_t = 10_000)]
        iterations: u64,

        /// Permit pool shared by the workers
        #[arg(long, default_value_t = 2)]
        permits: u32,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Stress {
            threads,
            iterations,
            permits,
        } => {
            kernel::start()?;
            println!(
                "Stressing with {} threads x {} iterations ({} permits)...",
                threads, iterations, permits
            );

            let lock = mutex::new(MutexAttrs::RECURSIVE)?;
            let pool = semaphore::new(permits, permits)?;
            let total = Arc::new(AtomicU64::new(0));

            let started = kernel::tick_count();
            let mut workers = Vec::with_capacity(threads);
            for worker in 0..threads {
                let total = Arc::clone(&total);
                workers.push(thread::spawn(move || -> Result<(), KernelError> {
                    for _ in 0..iterations {
                        semaphore::acquire(pool, Timeout::Forever)?;
                        mutex::acquire(lock, Timeout::Forever)?;
                        // Nested acquire exercises the recursion fast path.
                        mutex::acquire(lock, Timeout::Forever)?;
                        total.fetch_add(1, Ordering::Relaxed);
                        mutex::release(lock)?;
                        mutex::release(lock)?;
                        semaphore::release(pool)?;
                    }
                    debug!("worker {} done", worker);
                    Ok(())
                }));
            }
            for worker in workers {
                worker.join().map_err(|_| "worker panicked")??;
            }

            let elapsed = kernel::tick_count().wrapping_sub(started);
            println!(
                "{} critical sections in {} ticks",
                total.load(Ordering::Relaxed),
                elapsed
            );

            mutex::delete(lock)?;
            semaphore::delete(pool)?;
        }
    }

    Ok(())
}
