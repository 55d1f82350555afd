//! The double-buffered (and single-buffered fallback) dispatch loop (C4).
//!
//! This is the heart of the engine: partition `[start, start+n)` into
//! batches, overlap batch `i+1`'s kernel with batch `i`'s transfer and host
//! scan, and drive C5/C6 from the results.

use ocl::core;
use ocl::{Buffer, MemFlags, Queue};
use ouija_core::{CutoffState, FilterConfig, ResultRecord, Seed};

use crate::context::{GpuContext, GpuError};
use crate::kernel_cache::CompiledKernel;
use crate::progress::ProgressReporter;
use crate::scanner::scan_batch;
use crate::sizer::Sizing;

/// A slot's position in the *Empty -> Producing -> Ready -> Draining ->
/// Empty* state machine from the design notes. Submitting a kernel is legal
/// only from `Empty`; enqueuing a transfer only from `Ready`; scanning only
/// from `Draining`. The two slots run the machine out of phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SlotState {
    Empty,
    Producing,
    Ready,
    Draining,
}

struct Slot {
    device_buffer: Buffer<ResultRecord>,
    host_buffer: Vec<ResultRecord>,
    state: SlotState,
    kernel_event: Option<core::Event>,
    transfer_event: Option<core::Event>,
    batch_size: usize,
}

impl Slot {
    fn new(queue: &Queue, capacity: usize) -> Result<Self, GpuError> {
        let device_buffer = Buffer::<ResultRecord>::builder()
            .queue(queue.clone())
            .flags(MemFlags::new().write_only())
            .len(capacity)
            .build()?;
        Ok(Slot {
            device_buffer,
            host_buffer: vec![ResultRecord::default(); capacity],
            state: SlotState::Empty,
            kernel_event: None,
            transfer_event: None,
            batch_size: 0,
        })
    }
}

/// Counts accumulated over a dispatch run.
#[derive(Clone, Copy, Debug, Default)]
pub struct DispatchSummary {
    pub total_found: u64,
    pub total_processed: u64,
}

/// Result of a full dispatch run. `error` is set when a driver runtime error
/// (kernel launch or buffer read failure) aborted the loop early — per the
/// error handling policy this is not itself an `Err`: the loop still reports
/// whatever `summary` it accumulated before aborting, and it is up to the
/// caller to treat a present `error` as cause for a non-zero exit after
/// finishing teardown.
pub struct DispatchOutcome {
    pub summary: DispatchSummary,
    pub error: Option<GpuError>,
}

/// Drives the dispatch loop for a sweep of `n` seeds starting at `start`.
pub struct DispatchPipeline<'a> {
    ctx: &'a GpuContext,
    compiled: &'a CompiledKernel,
    sizing: Sizing,
    config: &'a FilterConfig,
    config_buffer: Buffer<u8>,
    double_buffered: bool,
    transfer_queue: Option<Queue>,
}

impl<'a> DispatchPipeline<'a> {
    pub fn new(
        ctx: &'a GpuContext,
        compiled: &'a CompiledKernel,
        sizing: Sizing,
        config: &'a FilterConfig,
        double_buffered: bool,
    ) -> Result<Self, GpuError> {
        let config_bytes = encode_config(config);
        let config_buffer = Buffer::<u8>::builder()
            .queue(ctx.compute_queue().clone())
            .flags(MemFlags::new().read_only())
            .len(config_bytes.len().max(1))
            .build()?;
        if !config_bytes.is_empty() {
            config_buffer.write(&config_bytes).enq()?;
        }

        let transfer_queue = if double_buffered {
            Some(ctx.new_transfer_queue()?)
        } else {
            None
        };

        Ok(DispatchPipeline {
            ctx,
            compiled,
            sizing,
            config,
            config_buffer,
            double_buffered,
            transfer_queue,
        })
    }

    /// Run the dispatch loop to completion, or until a driver runtime error
    /// aborts it early. `cutoff` is mutated in place so the caller (CLI) can
    /// observe the final value. `emit_row` is called for each CSV data row,
    /// in submission order; `on_progress` is polled after every batch for
    /// rate-limited progress lines. Setup failures (bad sizing, no device
    /// memory for the slots themselves) are returned as `Err` directly,
    /// distinct from in-loop runtime errors captured in the returned
    /// [`DispatchOutcome`].
    pub fn run(
        &mut self,
        start: Seed,
        n: u64,
        cutoff: &mut CutoffState,
        mut emit_row: impl FnMut(&str),
        mut on_progress: impl FnMut(&ProgressReporter, u64, u64, u64),
    ) -> Result<DispatchOutcome, GpuError> {
        if n == 0 {
            return Ok(DispatchOutcome {
                summary: DispatchSummary::default(),
                error: None,
            });
        }

        if self.double_buffered {
            self.run_double_buffered(start, n, cutoff, &mut emit_row, &mut on_progress)
        } else {
            self.run_single_buffered(start, n, cutoff, &mut emit_row, &mut on_progress)
        }
    }

    fn run_single_buffered(
        &mut self,
        start: Seed,
        n: u64,
        cutoff: &mut CutoffState,
        emit_row: &mut impl FnMut(&str),
        on_progress: &mut impl FnMut(&ProgressReporter, u64, u64, u64),
    ) -> Result<DispatchOutcome, GpuError> {
        let queue = self.ctx.compute_queue().clone();
        let mut slot = Slot::new(&queue, self.sizing.capacity)?;

        let mut seeds_remaining = n;
        let mut offset: u64 = 0;
        let mut total_found: u64 = 0;
        let mut total_processed: u64 = 0;
        let mut first_batch = true;
        let mut error = None;
        let mut reporter = ProgressReporter::new();

        while seeds_remaining > 0 {
            let batch_size = next_batch_size(seeds_remaining, self.sizing.capacity);

            if let Err(e) = self.dispatch_one_batch_single(
                &queue,
                &mut slot,
                start,
                batch_size,
                offset,
                cutoff,
                first_batch,
                emit_row,
                &mut total_found,
            ) {
                error = Some(e);
                break;
            }
            total_processed += batch_size as u64;

            let now = std::time::Instant::now();
            if reporter.should_report(now) {
                on_progress(&reporter, total_found, total_processed, n);
                reporter.mark_reported(now);
            }

            offset += batch_size as u64;
            seeds_remaining -= batch_size as u64;
            first_batch = false;
        }

        Ok(DispatchOutcome {
            summary: DispatchSummary {
                total_found,
                total_processed,
            },
            error,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn dispatch_one_batch_single(
        &self,
        queue: &Queue,
        slot: &mut Slot,
        start: Seed,
        batch_size: usize,
        offset: u64,
        cutoff: &mut CutoffState,
        first_batch: bool,
        emit_row: &mut impl FnMut(&str),
        total_found: &mut u64,
    ) -> Result<(), GpuError> {
        self.set_kernel_args(start, batch_size, offset, &slot.device_buffer)?;
        let global_work_size = self.sizing.global_work_size(batch_size);
        let kernel_event = enqueue_kernel(queue, self.compiled.kernel(), global_work_size)?;
        kernel_event
            .wait_for()
            .map_err(|e| GpuError::Other(format!("kernel launch failed: {e}")))?;

        slot.device_buffer.read(&mut slot.host_buffer[..batch_size]).enq()?;

        let outcome = scan_batch(&slot.host_buffer[..batch_size], cutoff, first_batch, self.config);
        log_auto_cutoff(first_batch, outcome.cutoff_raised, cutoff);
        for row in &outcome.rows {
            emit_row(row);
        }
        *total_found += outcome.rows.len() as u64;
        Ok(())
    }

    fn run_double_buffered(
        &mut self,
        start: Seed,
        n: u64,
        cutoff: &mut CutoffState,
        emit_row: &mut impl FnMut(&str),
        on_progress: &mut impl FnMut(&ProgressReporter, u64, u64, u64),
    ) -> Result<DispatchOutcome, GpuError> {
        let compute_queue = self.ctx.compute_queue().clone();
        let transfer_queue = self
            .transfer_queue
            .clone()
            .expect("double-buffered mode requires a transfer queue");

        let mut slots = [
            Slot::new(&compute_queue, self.sizing.capacity)?,
            Slot::new(&compute_queue, self.sizing.capacity)?,
        ];

        let mut seeds_remaining = n;
        let mut offset: u64 = 0;
        let mut p = 0usize;
        let mut first_batch = true;
        // True once the genuine first batch (batch index 0) has actually been
        // scanned -- distinct from `first_batch`, which tracks the *producing*
        // slot's position in the loop and goes false one iteration before
        // batch 0's data is scanned out of the other slot.
        let mut scanned_first_batch = false;
        let mut total_found: u64 = 0;
        let mut total_processed: u64 = 0;
        let mut error = None;
        let mut reporter = ProgressReporter::new();

        while seeds_remaining > 0 {
            let batch_size = next_batch_size(seeds_remaining, self.sizing.capacity);

            match self.dispatch_one_batch_double(
                &compute_queue,
                &transfer_queue,
                &mut slots,
                p,
                start,
                batch_size,
                offset,
                cutoff,
                first_batch,
                &mut scanned_first_batch,
                emit_row,
                &mut total_found,
            ) {
                Ok(()) => {}
                Err(e) => {
                    error = Some(e);
                    break;
                }
            }

            total_processed += batch_size as u64;
            let now = std::time::Instant::now();
            if reporter.should_report(now) {
                on_progress(&reporter, total_found, total_processed, n);
                reporter.mark_reported(now);
            }

            p = 1 - p;
            offset += batch_size as u64;
            seeds_remaining -= batch_size as u64;
            first_batch = false;
        }

        if error.is_none() {
            // Final drain: whichever slot still holds an outstanding transfer.
            for slot in &mut slots {
                if let Some(transfer_event) = slot.transfer_event.take() {
                    if let Err(e) = transfer_event
                        .wait_for()
                        .map_err(|e| GpuError::Other(format!("final transfer wait failed: {e}")))
                    {
                        error = Some(e);
                        break;
                    }
                    let is_first_scan = !scanned_first_batch;
                    let outcome = scan_batch(
                        &slot.host_buffer[..slot.batch_size],
                        cutoff,
                        is_first_scan,
                        self.config,
                    );
                    log_auto_cutoff(is_first_scan, outcome.cutoff_raised, cutoff);
                    for row in &outcome.rows {
                        emit_row(row);
                    }
                    total_found += outcome.rows.len() as u64;
                    slot.state = SlotState::Empty;
                    scanned_first_batch = true;
                }
            }
        }

        Ok(DispatchOutcome {
            summary: DispatchSummary {
                total_found,
                total_processed,
            },
            error,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn dispatch_one_batch_double(
        &self,
        compute_queue: &Queue,
        transfer_queue: &Queue,
        slots: &mut [Slot; 2],
        p: usize,
        start: Seed,
        batch_size: usize,
        offset: u64,
        cutoff: &mut CutoffState,
        first_batch: bool,
        scanned_first_batch: &mut bool,
        emit_row: &mut impl FnMut(&str),
        total_found: &mut u64,
    ) -> Result<(), GpuError> {
        // Step 2: set args and enqueue the kernel into slot p.
        self.set_kernel_args(start, batch_size, offset, &slots[p].device_buffer)?;
        let global_work_size = self.sizing.global_work_size(batch_size);
        let kernel_event = enqueue_kernel(compute_queue, self.compiled.kernel(), global_work_size)?;
        slots[p].kernel_event = Some(kernel_event);
        slots[p].state = SlotState::Producing;
        slots[p].batch_size = batch_size;

        // Step 3: wait on the other slot's prior transfer, if any -- it is
        // now host-owned -- then (step 4) scan it, unless this is the very
        // first batch (nothing to scan yet). Note this scan, when it
        // happens here for the first time, is of batch index 0's data --
        // `scanned_first_batch` (not the outer per-iteration `first_batch`)
        // is what tells `scan_batch`/`log_auto_cutoff` that.
        let other = 1 - p;
        if let Some(transfer_event) = slots[other].transfer_event.take() {
            transfer_event
                .wait_for()
                .map_err(|e| GpuError::Other(format!("transfer wait failed: {e}")))?;
            slots[other].state = SlotState::Draining;
        }

        if !first_batch {
            let is_first_scan = !*scanned_first_batch;
            let other_batch_size = slots[other].batch_size;
            let outcome = scan_batch(
                &slots[other].host_buffer[..other_batch_size],
                cutoff,
                is_first_scan,
                self.config,
            );
            log_auto_cutoff(is_first_scan, outcome.cutoff_raised, cutoff);
            for row in &outcome.rows {
                emit_row(row);
            }
            *total_found += outcome.rows.len() as u64;
            slots[other].state = SlotState::Empty;
            *scanned_first_batch = true;
        }

        // Step 5: wait on this batch's kernel.
        let kernel_event = slots[p].kernel_event.take().expect("kernel_event set above");
        kernel_event
            .wait_for()
            .map_err(|e| GpuError::Other(format!("kernel wait failed: {e}")))?;
        slots[p].state = SlotState::Ready;

        // Step 6: async read on the transfer queue, gated on kernel_event.
        let transfer_event = enqueue_read(
            transfer_queue,
            &slots[p].device_buffer,
            &mut slots[p].host_buffer[..batch_size],
            &kernel_event,
        )?;
        slots[p].transfer_event = Some(transfer_event);
        Ok(())
    }

    /// Set the kernel's first five arguments per the §4.3 contract:
    /// `(0) starting_seed[8]`, `(1) seeds_in_batch`, `(2) config_buffer`,
    /// `(3) result_buffer`, `(4) batch_offset`.
    fn set_kernel_args(
        &self,
        start: Seed,
        batch_size: usize,
        batch_offset: u64,
        result_buffer: &Buffer<ResultRecord>,
    ) -> Result<(), GpuError> {
        let starting_seed = start.to_seed_string();
        let mut starting_seed_bytes = [0u8; 8];
        starting_seed_bytes.copy_from_slice(starting_seed.as_bytes());

        let kernel = self.compiled.kernel();
        core::set_kernel_arg(kernel, 0, core::ArgVal::vector(&starting_seed_bytes))?;
        core::set_kernel_arg(kernel, 1, core::ArgVal::scalar(&(batch_size as i64)))?;
        core::set_kernel_arg(kernel, 2, core::ArgVal::mem(self.config_buffer.as_core()))?;
        core::set_kernel_arg(kernel, 3, core::ArgVal::mem(result_buffer.as_core()))?;
        core::set_kernel_arg(kernel, 4, core::ArgVal::scalar(&(batch_offset as i64)))?;
        Ok(())
    }
}

/// Pack a [`FilterConfig`] into the byte buffer handed to the kernel as
/// argument 2. The kernel template's exact interpretation of these bytes is
/// outside this crate's concern (see the purpose statement); this is just a
/// stable, deterministic host-side encoding of the data model fields the
/// kernel needs: `max_search_ante`, `deck`, `stake`, then `needs` and `wants`
/// as `(value: u32, joker_edition: u32, desire_by_ante: u8)` triples.
fn encode_config(config: &FilterConfig) -> Vec<u8> {
    let mut out = Vec::new();
    out.push(config.max_search_ante);
    out.extend_from_slice(&config.deck.to_le_bytes());
    out.extend_from_slice(&config.stake.to_le_bytes());
    out.push(u8::try_from(config.needs.len()).unwrap_or(u8::MAX));
    for desire in &config.needs {
        out.extend_from_slice(&desire.value.to_le_bytes());
        out.extend_from_slice(&desire.joker_edition.to_le_bytes());
        out.push(desire.desire_by_ante);
    }
    out.push(u8::try_from(config.wants.len()).unwrap_or(u8::MAX));
    for desire in &config.wants {
        out.extend_from_slice(&desire.value.to_le_bytes());
        out.extend_from_slice(&desire.joker_edition.to_le_bytes());
        out.push(desire.desire_by_ante);
    }
    out
}

/// Size of the next batch given how many seeds remain and the slot capacity:
/// `min(capacity, seeds_remaining)`. Split out as a pure helper so invariant 1
/// from the testable-properties list (every batch gets exactly this many
/// seeds; batch sizes sum to `n`) is checkable without a live device.
fn next_batch_size(seeds_remaining: u64, capacity: usize) -> usize {
    seeds_remaining.min(capacity as u64) as usize
}

fn enqueue_kernel(queue: &Queue, kernel: &core::Kernel, global_work_size: usize) -> Result<core::Event, GpuError> {
    let mut event = core::Event::null();
    core::enqueue_kernel(
        queue.as_core(),
        kernel,
        1,
        None,
        &[global_work_size, 1, 1],
        None::<[usize; 3]>,
        None::<core::Event>,
        Some(&mut event),
    )?;
    Ok(event)
}

/// Enqueue an asynchronous device-to-host read on `queue`, gated on
/// `wait_event` (the producing kernel's completion event).
fn enqueue_read(
    queue: &Queue,
    buffer: &Buffer<ResultRecord>,
    host_buffer: &mut [ResultRecord],
    wait_event: &core::Event,
) -> Result<core::Event, GpuError> {
    let mut event = core::Event::null();
    unsafe {
        core::enqueue_read_buffer(
            queue.as_core(),
            buffer.as_core(),
            false,
            0,
            host_buffer,
            Some(vec![wait_event.clone()]),
            Some(&mut event),
        )?;
    }
    Ok(event)
}

fn log_auto_cutoff(first_batch: bool, cutoff_raised: bool, cutoff: &CutoffState) {
    if first_batch && cutoff.is_auto() && cutoff_raised {
        println!("$[AUTO] First batch cutoff set to {}", cutoff.current());
    }
}
