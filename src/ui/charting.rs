use ratatui::{
    style::{Modifier, Style},
    text::Span,
    widgets::{Axis, Chart, Dataset, GraphType},
};

/// Pair each running-average value with its 1-based answer number
pub fn latency_points(series: &[f64]) -> Vec<(f64, f64)> {
    series
        .iter()
        .enumerate()
        .map(|(i, &ms)| ((i + 1) as f64, ms))
        .collect()
}

/// X (answers) and Y (milliseconds) upper bounds for the latency chart
pub fn compute_chart_params(points: &[(f64, f64)]) -> (f64, f64) {
    let highest_ms = points.iter().map(|&(_, ms)| ms).fold(0.0, f64::max);

    let answers = match points.last() {
        Some(&(x, _)) => x,
        None => 1.0,
    };

    (answers.max(2.0), highest_ms.ceil().max(1.0))
}

/// Format a simple numeric label consistently
pub fn format_label(val: f64) -> String {
    if (val - val.round()).abs() < f64::EPSILON {
        format!("{}", val.round())
    } else {
        format!("{val:.2}")
    }
}

/// Line chart of average response time over the session
pub fn latency_chart<'a>(points: &'a [(f64, f64)], style: Style) -> Chart<'a> {
    let bold_style = Style::default().add_modifier(Modifier::BOLD);
    let (answers, highest_ms) = compute_chart_params(points);

    let datasets = vec![Dataset::default()
        .marker(ratatui::symbols::Marker::Braille)
        .style(style)
        .graph_type(GraphType::Line)
        .data(points)];

    Chart::new(datasets)
        .x_axis(
            Axis::default()
                .title("answers")
                .bounds([1.0, answers])
                .labels(vec![
                    Span::styled("1", bold_style),
                    Span::styled(format_label(answers), bold_style),
                ]),
        )
        .y_axis(
            Axis::default()
                .title("avg ms")
                .bounds([0.0, highest_ms])
                .labels(vec![
                    Span::styled("0", bold_style),
                    Span::styled(format_label(highest_ms), bold_style),
                ]),
        )
}
