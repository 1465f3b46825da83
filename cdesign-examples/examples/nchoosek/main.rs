use cdesign::{
    Constraint, ContinuousInput, DesignOptions, Domain, Input, OptimalDesign, Result,
    build_formula,
};

// four component mixture where every experiment uses at most two components
fn main() -> Result<()> {
    let keys = ["x1", "x2", "x3", "x4"];
    let inputs = keys
        .iter()
        .map(|k| Ok(ContinuousInput::new(*k, 0., 1.)?.into()))
        .collect::<Result<Vec<Input>>>()?;
    let constraints = vec![
        Constraint::linear_equality(&keys, vec![1.; 4], 1.)?,
        Constraint::nchoosek(&keys, 0, 2, false)?,
    ];
    let domain = Domain::new(inputs, vec![], constraints)?;
    let formula = build_formula("x1 + x2 + x3 + x4 - 1", &domain)?;

    let design = OptimalDesign::new(&domain, formula)
        .with_n_experiments(8)
        .with_options(DesignOptions::new().with_seed(1))
        .find()?;

    println!("{design}");
    for w in &design.warnings {
        println!("warning: {w:?}");
    }
    Ok(())
}
