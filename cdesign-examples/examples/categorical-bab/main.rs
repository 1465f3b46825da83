use cdesign::{
    BranchAndBoundOptions, CategoricalInput, ContinuousInput, DesignOptions, DiscreteInput, Domain,
    Input, OptimalDesign, Result, SearchStrategy, build_formula,
};
use std::time::Duration;

// mixed domain searched by branch and bound over the relaxed categorical binaries
fn main() -> Result<()> {
    let inputs: Vec<Input> = vec![
        ContinuousInput::new("temperature", 20., 80.)?.into(),
        DiscreteInput::new("stirring", vec![100., 200., 400., 800.])?.into(),
        CategoricalInput::new(
            "catalyst",
            vec!["pd".into(), "pt".into(), "ni".into()],
        )?
        .into(),
    ];
    let domain = Domain::new(inputs, vec![], vec![])?;
    let formula = build_formula("linear", &domain)?;

    let strategy = SearchStrategy::BranchAndBound(
        BranchAndBoundOptions::new()
            .with_max_nodes(200)
            .with_time_budget(Duration::from_secs(30)),
    );
    let design = OptimalDesign::new(&domain, formula)
        .with_n_experiments(9)
        .with_options(DesignOptions::new().with_strategy(strategy).with_seed(3))
        .find()?;

    println!("{design}");
    Ok(())
}
