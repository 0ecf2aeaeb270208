//! Window-to-band-power transform
//!
//! Power spectral density is a pluggable capability ([`PsdEstimator`]);
//! [`WelchPsd`] is the default. [`BandPowerEstimator`] averages the
//! per-channel spectra and reduces them to one mean power per band.

use crate::window_buffer::WindowView;
use bwm_core::{BandPower, BandPowerResult, BandSet, BwmError, BwmResult};
use num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};
use std::f64::consts::PI;
use std::sync::Arc;

/// One-sided power spectral density
#[derive(Debug, Clone, PartialEq)]
pub struct Psd {
    /// Bin centre frequencies in Hz
    pub frequencies: Vec<f64>,
    /// Power density per bin (units²/Hz)
    pub power: Vec<f64>,
}

/// Spectral density estimator for a single evenly sampled signal
pub trait PsdEstimator: Send + Sync {
    /// Estimate the PSD of `signal` sampled at `sampling_rate`, using
    /// analysis segments of `segment_len` samples
    fn estimate_psd(&self, signal: &[f64], sampling_rate: f64, segment_len: usize) -> BwmResult<Psd>;

    fn name(&self) -> &str;
}

/// Welch's averaged periodogram
///
/// Periodic Hann window, 50% segment overlap, per-segment mean removal,
/// density scaling and a one-sided spectrum.
pub struct WelchPsd {
    segment_len: usize,
    plan: Arc<dyn RealToComplex<f64>>,
}

impl WelchPsd {
    /// Create an estimator with the FFT planned for `segment_len`
    pub fn new(segment_len: usize) -> BwmResult<Self> {
        if segment_len == 0 {
            return Err(BwmError::InvalidConfig {
                reason: "Welch segment length must be greater than 0".to_string(),
            });
        }

        let plan = RealFftPlanner::<f64>::new().plan_fft_forward(segment_len);
        Ok(WelchPsd { segment_len, plan })
    }

    pub fn segment_len(&self) -> usize {
        self.segment_len
    }

    fn plan_for(&self, len: usize) -> Arc<dyn RealToComplex<f64>> {
        if len == self.segment_len {
            Arc::clone(&self.plan)
        } else {
            RealFftPlanner::<f64>::new().plan_fft_forward(len)
        }
    }
}

/// Periodic Hann window of length `len`
pub fn hann_periodic(len: usize) -> Vec<f64> {
    if len == 1 {
        return vec![1.0];
    }

    (0..len)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / len as f64).cos())
        .collect()
}

impl PsdEstimator for WelchPsd {
    fn estimate_psd(&self, signal: &[f64], sampling_rate: f64, segment_len: usize) -> BwmResult<Psd> {
        if signal.is_empty() {
            return Err(BwmError::Estimation {
                reason: "cannot estimate PSD of an empty signal".to_string(),
            });
        }

        if !(sampling_rate > 0.0) || segment_len == 0 {
            return Err(BwmError::Estimation {
                reason: format!(
                    "invalid sampling rate {} or segment length {}",
                    sampling_rate, segment_len
                ),
            });
        }

        // Short signals shrink the segment rather than zero-padding
        let nperseg = segment_len.min(signal.len());
        let noverlap = nperseg / 2;
        let step = nperseg - noverlap;
        let segments = (signal.len() - nperseg) / step + 1;

        let window = hann_periodic(nperseg);
        let window_power: f64 = window.iter().map(|w| w * w).sum();
        let scale = 1.0 / (sampling_rate * window_power);

        let fft = self.plan_for(nperseg);
        let mut input = fft.make_input_vec();
        let mut spectrum: Vec<Complex<f64>> = fft.make_output_vec();
        let mut power = vec![0.0; spectrum.len()];

        for seg in 0..segments {
            let segment = &signal[seg * step..seg * step + nperseg];
            let mean = segment.iter().sum::<f64>() / nperseg as f64;

            for ((slot, &x), &w) in input.iter_mut().zip(segment).zip(&window) {
                *slot = (x - mean) * w;
            }

            fft.process(&mut input, &mut spectrum)
                .map_err(|e| BwmError::Estimation { reason: e.to_string() })?;

            for (acc, bin) in power.iter_mut().zip(&spectrum) {
                *acc += bin.norm_sqr() * scale;
            }
        }

        // Fold negative frequencies in; DC and Nyquist have no mirror
        let last = power.len() - 1;
        let doubled_end = if nperseg % 2 == 0 { last } else { last + 1 };
        for p in power.iter_mut().take(doubled_end).skip(1) {
            *p *= 2.0;
        }

        for p in power.iter_mut() {
            *p /= segments as f64;
        }

        let resolution = sampling_rate / nperseg as f64;
        let frequencies = (0..power.len()).map(|k| k as f64 * resolution).collect();

        Ok(Psd { frequencies, power })
    }

    fn name(&self) -> &str {
        "welch"
    }
}

/// Converts full windows into per-band mean power
pub struct BandPowerEstimator {
    bands: BandSet,
    sampling_rate: f64,
    segment_len: usize,
    psd: Box<dyn PsdEstimator>,
}

impl BandPowerEstimator {
    /// Welch estimator with one-second segments (1 Hz bins)
    pub fn new(bands: BandSet, sampling_rate: f64) -> BwmResult<Self> {
        let segment_len = Self::segment_len_for(sampling_rate)?;
        let psd = WelchPsd::new(segment_len)?;
        Ok(Self::with_psd(bands, sampling_rate, segment_len, Box::new(psd)))
    }

    /// Estimator with a custom PSD implementation
    pub fn with_psd(
        bands: BandSet,
        sampling_rate: f64,
        segment_len: usize,
        psd: Box<dyn PsdEstimator>,
    ) -> Self {
        BandPowerEstimator {
            bands,
            sampling_rate,
            segment_len,
            psd,
        }
    }

    fn segment_len_for(sampling_rate: f64) -> BwmResult<usize> {
        let len = sampling_rate.round();
        if !len.is_finite() || len < 1.0 {
            return Err(BwmError::InvalidConfig {
                reason: format!("sampling rate {} Hz is not usable", sampling_rate),
            });
        }
        Ok(len as usize)
    }

    pub fn bands(&self) -> &BandSet {
        &self.bands
    }

    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    /// Channel-averaged PSD of a window
    pub fn average_psd(&self, window: &WindowView<'_>) -> BwmResult<Psd> {
        if window.is_empty() {
            return Err(BwmError::Estimation {
                reason: "window is empty".to_string(),
            });
        }

        if let Some(bad) = window.samples().iter().find(|x| !x.is_finite()) {
            return Err(BwmError::Estimation {
                reason: format!("window contains non-finite sample {}", bad),
            });
        }

        let mut average: Option<Psd> = None;
        for ch in 0..window.channels() {
            let signal = window.channel(ch).unwrap_or_default();
            let psd = self.psd.estimate_psd(&signal, self.sampling_rate, self.segment_len)?;

            if let Some(acc) = average.as_mut() {
                if acc.power.len() != psd.power.len() {
                    return Err(BwmError::Estimation {
                        reason: "channel spectra have different lengths".to_string(),
                    });
                }
                for (a, p) in acc.power.iter_mut().zip(&psd.power) {
                    *a += p;
                }
                continue;
            }
            average = Some(psd);
        }

        let mut average = average.ok_or_else(|| BwmError::Estimation {
            reason: "window has no channels".to_string(),
        })?;
        let channels = window.channels() as f64;
        for p in average.power.iter_mut() {
            *p /= channels;
        }

        Ok(average)
    }

    /// Band powers for one full window
    ///
    /// A band with no bins inside its range reports 0.
    pub fn estimate(&self, window: &WindowView<'_>, timestamp: f64) -> BwmResult<BandPowerResult> {
        let psd = self.average_psd(window)?;

        let bands = self
            .bands
            .iter()
            .map(|band| {
                let (sum, count) = psd
                    .frequencies
                    .iter()
                    .zip(&psd.power)
                    .filter(|(f, _)| band.contains(**f))
                    .fold((0.0, 0usize), |(s, n), (_, p)| (s + p, n + 1));

                BandPower {
                    name: band.name.clone(),
                    power: if count > 0 { sum / count as f64 } else { 0.0 },
                }
            })
            .collect::<Vec<_>>();

        if let Some(bad) = bands.iter().find(|b| !b.power.is_finite()) {
            return Err(BwmError::Estimation {
                reason: format!("{} power overflowed to {}", bad.name, bad.power),
            });
        }

        Ok(BandPowerResult { timestamp, bands })
    }
}
