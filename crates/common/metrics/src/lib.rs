use prometheus_exporter::prometheus::{
    HistogramTimer, HistogramVec, IntCounterVec, default_registry,
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
};

// Provisioning each metrics
lazy_static::lazy_static! {
    pub static ref EPOCH_PROCESSING_TIME: HistogramVec = create_histogram_vec(
        "beacon_epoch_processing_time",
        "Duration of each stage of the epoch transition",
        &["stage"]
    );

    pub static ref EPOCH_CACHE_BUILD_TIME: HistogramVec = create_histogram_vec(
        "beacon_epoch_cache_build_time",
        "Duration of building the per-epoch process cache",
        &["fork"]
    );

    pub static ref BLOCK_PROCESSING_TIME: HistogramVec = create_histogram_vec(
        "beacon_block_processing_time",
        "Duration of each stage of the block transition",
        &["stage"]
    );

    pub static ref SIGNATURE_SETS_VERIFIED: IntCounterVec = create_int_counter_vec(
        "beacon_signature_sets_verified_total",
        "Number of signature sets submitted for verification, by outcome",
        &["result"]
    );
}

/// Create a new counter metric
pub fn create_int_counter_vec(name: &str, help: &str, label_names: &[&str]) -> IntCounterVec {
    let registry = default_registry();
    register_int_counter_vec_with_registry!(name, help, label_names, registry)
        .expect("failed to create int counter vec")
}

/// Increase the value of a counter metric
pub fn inc_int_counter_vec(counter_vec: &IntCounterVec, amount: u64, label_values: &[&str]) {
    counter_vec.with_label_values(label_values).inc_by(amount);
}

/// Create a new histogram metric
pub fn create_histogram_vec(name: &str, help: &str, label_names: &[&str]) -> HistogramVec {
    let registry = default_registry();
    register_histogram_vec_with_registry!(name, help, label_names, registry)
        .expect("failed to create histogram")
}

/// Start a timer for a histogram metric
pub fn start_timer_vec(histogram_vec: &HistogramVec, label_values: &[&str]) -> HistogramTimer {
    histogram_vec.with_label_values(label_values).start_timer()
}

/// Stop a timer for a histogram metric
pub fn stop_timer(timer: HistogramTimer) {
    timer.observe_duration()
}
