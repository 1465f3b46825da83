use cdesign::{
    Constraint, ContinuousInput, Criterion, DesignOptions, Domain, Input, OptimalDesign, Result,
    build_formula,
};

// three component mixture with an additional upper limit on x1 + x2
fn main() -> Result<()> {
    let inputs: Vec<Input> = vec![
        ContinuousInput::new("x1", 0., 1.)?.into(),
        ContinuousInput::new("x2", 0.1, 1.)?.into(),
        ContinuousInput::new("x3", 0., 0.6)?.into(),
    ];
    let constraints = vec![
        Constraint::linear_equality(&["x1", "x2", "x3"], vec![1., 1., 1.], 1.)?,
        Constraint::linear_inequality(&["x1", "x2"], vec![1., 1.], 0.9)?,
    ];
    let domain = Domain::new(inputs, vec![], constraints)?;

    // Scheffé model, the intercept is collinear with x1 + x2 + x3 = 1
    let formula = build_formula("x1 + x2 + x3 + x1:x2 + x1:x3 + x2:x3 - 1", &domain)?;

    let design = OptimalDesign::new(&domain, formula)
        .with_n_experiments(10)
        .with_options(DesignOptions::new().with_criterion(Criterion::D).with_seed(42))
        .find()?;

    println!("{design}");
    Ok(())
}
