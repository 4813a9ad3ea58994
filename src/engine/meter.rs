//! Running statistics and step cadence

use crate::config::TrainSpec;

/// Cumulative statistic tracker: current value, running sum, count, average
#[derive(Debug, Clone)]
pub struct AverageMeter {
    name: String,
    /// Most recent sample
    pub val: f32,
    /// Weighted running sum
    pub sum: f32,
    /// Total sample weight
    pub count: u64,
    /// Weighted average, 0 while no samples have arrived
    pub avg: f32,
}

impl AverageMeter {
    /// Create a meter for one tracked quantity
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            val: 0.0,
            sum: 0.0,
            count: 0,
            avg: 0.0,
        }
    }

    /// Meter name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record a sample with weight `n` (sample count)
    pub fn update(&mut self, val: f32, n: u64) {
        self.val = val;
        self.sum += val * n as f32;
        self.count += n;
        self.avg = if self.count != 0 {
            self.sum / self.count as f32
        } else {
            0.0
        };
    }
}

/// The step intervals driving periodic engine behavior
#[derive(Debug, Clone, Copy)]
pub struct StepCadence {
    /// Emit a progress line every `log` steps
    pub log: u64,
    /// Render visualizations every `vis` steps
    pub vis: u64,
    /// Run evaluation every `eval` steps
    pub eval: u64,
    /// Write a routine checkpoint every `save` steps
    pub save: u64,
    /// Loop bound, carried for progress formatting
    pub max: u64,
}

impl StepCadence {
    /// Pull the cadence out of the training configuration
    pub fn from_spec(train: &TrainSpec) -> Self {
        Self {
            log: train.log_interval,
            vis: train.vis_interval,
            eval: train.eval_interval,
            save: train.save_interval,
            max: train.max_steps,
        }
    }
}

/// Format the periodic progress line
///
/// Mirrors the shape `Step: [cur/max]  Type: …  Time: cur(avg)  Speed: …
/// Data: cur(avg)  loss:cur(avg)…` so log scrapers keep working across
/// models.
pub fn progress_message(
    step: u64,
    max_step: u64,
    model_type: &str,
    batch_time: &AverageMeter,
    batch_size: usize,
    data_time: &AverageMeter,
    losses: &[&AverageMeter],
) -> String {
    let speed = if batch_time.val > 0.0 {
        batch_size as f32 / batch_time.val
    } else {
        0.0
    };

    let mut loss_string = String::new();
    for (index, meter) in losses.iter().enumerate() {
        loss_string.push_str(&format!("{}:{:.5}({:.5})", meter.name(), meter.val, meter.avg));
        if index != losses.len() - 1 {
            loss_string.push('\t');
        }
    }

    format!(
        "Step: [{step}/{max_step}]\tType: {model_type}\tTime: {:.2}s ({:.2}s)\tSpeed: {speed:.1} samples/s\tData: {:.2}s ({:.2}s)\t{loss_string}",
        batch_time.val, batch_time.avg, data_time.val, data_time.avg
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_meter_starts_at_zero() {
        let meter = AverageMeter::new("loss_g");
        assert_eq!(meter.val, 0.0);
        assert_eq!(meter.avg, 0.0);
        assert_eq!(meter.count, 0);
        assert_eq!(meter.name(), "loss_g");
    }

    #[test]
    fn test_meter_weighted_average() {
        let mut meter = AverageMeter::new("t");
        meter.update(1.0, 2);
        meter.update(4.0, 1);
        // (1*2 + 4*1) / 3 = 2.0
        assert_relative_eq!(meter.avg, 2.0);
        assert_eq!(meter.val, 4.0);
        assert_eq!(meter.count, 3);
    }

    #[test]
    fn test_meter_zero_weight_guard() {
        let mut meter = AverageMeter::new("t");
        meter.update(5.0, 0);
        // No division error; average stays 0
        assert_eq!(meter.avg, 0.0);
        assert_eq!(meter.val, 5.0);
    }

    #[test]
    fn test_progress_message_contains_losses() {
        let mut batch_time = AverageMeter::new("batch");
        batch_time.update(0.5, 1);
        let mut data_time = AverageMeter::new("data");
        data_time.update(0.1, 1);
        let mut loss_g = AverageMeter::new("loss_g");
        loss_g.update(0.25, 1);
        let mut loss_d = AverageMeter::new("loss_d");
        loss_d.update(0.75, 1);

        let msg = progress_message(10, 100, "ma", &batch_time, 4, &data_time, &[&loss_g, &loss_d]);

        assert!(msg.contains("Step: [10/100]"));
        assert!(msg.contains("Type: ma"));
        assert!(msg.contains("loss_g:0.25000(0.25000)"));
        assert!(msg.contains("loss_d:0.75000"));
        assert!(msg.contains("Speed: 8.0 samples/s"));
    }

    #[test]
    fn test_progress_message_zero_time() {
        let batch_time = AverageMeter::new("batch");
        let data_time = AverageMeter::new("data");
        let msg = progress_message(0, 10, "ma", &batch_time, 1, &data_time, &[]);
        assert!(msg.contains("Speed: 0.0"));
    }

    #[test]
    fn test_cadence_from_spec() {
        let train: TrainSpec = serde_yaml::from_str(
            r#"
max_steps: 200
log_interval: 5
vis_interval: 25
eval_interval: 10
save_interval: 20
lamada: {}
optimizer:
  name: sgd
  lr: 0.01
"#,
        )
        .unwrap();

        let cadence = StepCadence::from_spec(&train);
        assert_eq!(cadence.log, 5);
        assert_eq!(cadence.vis, 25);
        assert_eq!(cadence.eval, 10);
        assert_eq!(cadence.save, 20);
        assert_eq!(cadence.max, 200);
    }
}
