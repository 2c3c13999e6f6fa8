/// Binance USDⓈ-M futures REST [`MetricSource`](pulse_engine::sampler::MetricSource).
pub mod binance;
