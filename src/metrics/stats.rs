//! Sample statistics over decimal slices.
//!
//! Conventions follow the usual dataframe defaults: sample (n - 1)
//! denominators, linear quantile interpolation, bias-corrected skew and
//! excess kurtosis.

use rust_decimal::prelude::*;
use serde::Serialize;

use super::MetricCell;
use crate::error::InsufficientData;

fn need(values: &[Decimal], n: usize) -> Result<(), InsufficientData> {
    if values.is_empty() {
        Err(InsufficientData::EmptyPeriod)
    } else if values.len() < n {
        Err(InsufficientData::TooFewObservations {
            have: values.len(),
            need: n,
        })
    } else {
        Ok(())
    }
}

fn count(values: &[Decimal]) -> Decimal {
    Decimal::from(values.len())
}

/// Quotient, or `ZeroDenominator` when `den` is zero
pub fn ratio(num: Decimal, den: Decimal) -> MetricCell {
    if den.is_zero() {
        Err(InsufficientData::ZeroDenominator)
    } else {
        num.checked_div(den).ok_or(InsufficientData::ZeroDenominator)
    }
}

pub fn sqrt(value: Decimal) -> MetricCell {
    value.sqrt().ok_or(InsufficientData::ZeroDenominator)
}

pub fn mean(values: &[Decimal]) -> MetricCell {
    need(values, 1)?;
    Ok(values.iter().sum::<Decimal>() / count(values))
}

pub fn sum(values: &[Decimal]) -> Decimal {
    values.iter().sum()
}

pub fn variance(values: &[Decimal]) -> MetricCell {
    need(values, 2)?;
    let m = mean(values)?;
    let squares: Decimal = values.iter().map(|v| (*v - m) * (*v - m)).sum();
    Ok(squares / (count(values) - Decimal::ONE))
}

pub fn std_dev(values: &[Decimal]) -> MetricCell {
    sqrt(variance(values)?)
}

/// Sample covariance of two equally long slices
pub fn covariance(a: &[Decimal], b: &[Decimal]) -> MetricCell {
    let n = a.len().min(b.len());
    let (a, b) = (&a[..n], &b[..n]);
    need(a, 2)?;
    let (ma, mb) = (mean(a)?, mean(b)?);
    let products: Decimal = a.iter().zip(b).map(|(x, y)| (*x - ma) * (*y - mb)).sum();
    Ok(products / Decimal::from(n - 1))
}

pub fn min(values: &[Decimal]) -> MetricCell {
    values.iter().copied().min().ok_or(InsufficientData::EmptyPeriod)
}

pub fn max(values: &[Decimal]) -> MetricCell {
    values.iter().copied().max().ok_or(InsufficientData::EmptyPeriod)
}

/// Quantile with linear interpolation between closest ranks
pub fn quantile(values: &[Decimal], q: Decimal) -> MetricCell {
    need(values, 1)?;
    let mut sorted = values.to_vec();
    sorted.sort();

    let position = q.clamp(Decimal::ZERO, Decimal::ONE) * Decimal::from(sorted.len() - 1);
    let lower = position.floor();
    let idx = lower.to_usize().unwrap_or(0).min(sorted.len() - 1);
    let fraction = position - lower;
    match sorted.get(idx + 1) {
        Some(upper) if !fraction.is_zero() => Ok(sorted[idx] + (*upper - sorted[idx]) * fraction),
        _ => Ok(sorted[idx]),
    }
}

fn central_moments(values: &[Decimal]) -> Result<(Decimal, Decimal, Decimal), InsufficientData> {
    let m = mean(values)?;
    let n = count(values);
    let (mut m2, mut m3, mut m4) = (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO);
    for v in values {
        let d = *v - m;
        let d2 = d * d;
        m2 += d2;
        m3 += d2 * d;
        m4 += d2 * d2;
    }
    Ok((m2 / n, m3 / n, m4 / n))
}

/// Adjusted Fisher-Pearson skewness
pub fn skew(values: &[Decimal]) -> MetricCell {
    need(values, 3)?;
    let n = count(values);
    let (m2, m3, _) = central_moments(values)?;
    let spread = m2 * sqrt(m2)?;
    let g1 = ratio(m3, spread)?;
    let adjust = ratio(sqrt(n * (n - Decimal::ONE))?, n - Decimal::TWO)?;
    Ok(adjust * g1)
}

/// Bias-corrected excess kurtosis
pub fn kurtosis(values: &[Decimal]) -> MetricCell {
    need(values, 4)?;
    let n = count(values);
    let one = Decimal::ONE;
    let two = Decimal::TWO;
    let three = Decimal::from(3);
    let (m2, _, m4) = central_moments(values)?;
    // Back from population moments to sums of powered deviations
    let (s2, s4) = (m2 * n, m4 * n);

    let fit = ratio(n * (n + one) * (n - one) * s4, (n - two) * (n - three) * s2 * s2)?;
    let adjust = ratio(three * (n - one) * (n - one), (n - two) * (n - three))?;
    Ok(fit - adjust)
}

/// Coefficient of determination of `predicted` against `actual`
pub fn r2_score(actual: &[Decimal], predicted: &[Decimal]) -> MetricCell {
    let n = actual.len().min(predicted.len());
    let (actual, predicted) = (&actual[..n], &predicted[..n]);
    need(actual, 2)?;
    let m = mean(actual)?;
    let ss_res: Decimal = actual.iter().zip(predicted).map(|(a, p)| (*a - *p) * (*a - *p)).sum();
    let ss_tot: Decimal = actual.iter().map(|a| (*a - m) * (*a - m)).sum();
    Ok(Decimal::ONE - ratio(ss_res, ss_tot)?)
}

/// Summary statistics of a return series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Description {
    pub count: usize,
    pub mean: Option<Decimal>,
    pub std: Option<Decimal>,
    pub min: Option<Decimal>,
    pub q25: Option<Decimal>,
    pub median: Option<Decimal>,
    pub q75: Option<Decimal>,
    pub max: Option<Decimal>,
}

impl Description {
    /// Row labels paired with values, in display order
    pub fn rows(&self) -> Vec<(&'static str, MetricCell)> {
        let cell = |v: Option<Decimal>| v.ok_or(InsufficientData::EmptyPeriod);
        vec![
            ("count", Ok(Decimal::from(self.count))),
            ("mean", cell(self.mean)),
            ("std", cell(self.std)),
            ("min", cell(self.min)),
            ("25%", cell(self.q25)),
            ("50%", cell(self.median)),
            ("75%", cell(self.q75)),
            ("max", cell(self.max)),
        ]
    }
}

pub fn describe(values: &[Decimal]) -> Description {
    Description {
        count: values.len(),
        mean: mean(values).ok(),
        std: std_dev(values).ok(),
        min: min(values).ok(),
        q25: quantile(values, Decimal::new(25, 2)).ok(),
        median: quantile(values, Decimal::new(5, 1)).ok(),
        q75: quantile(values, Decimal::new(75, 2)).ok(),
        max: max(values).ok(),
    }
}
