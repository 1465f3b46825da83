use cdesign::{
    Constraint, ContinuousInput, Domain, Input, PolytopeSampler, Result, SamplerOptions,
};

// uniform space filling samples of a constrained mixture
fn main() -> Result<()> {
    let inputs: Vec<Input> = vec![
        ContinuousInput::new("x1", 0., 1.)?.into(),
        ContinuousInput::new("x2", 0., 1.)?.into(),
        ContinuousInput::new("x3", 0.2, 1.)?.into(),
    ];
    let constraints = vec![
        Constraint::linear_equality(&["x1", "x2", "x3"], vec![1., 1., 1.], 1.)?,
        Constraint::linear_inequality(&["x1", "x2"], vec![2., -1.], 0.3)?,
    ];
    let domain = Domain::new(inputs, vec![], constraints)?;

    let options = SamplerOptions::new()
        .with_n_burnin(500)
        .with_n_thinning(10)
        .with_seed(7);
    let mut sampler = PolytopeSampler::new(&domain, options);
    let table = sampler.ask(20)?;
    println!("{table}");

    // the chain continues, so the next batch differs
    let more = sampler.ask(5)?;
    println!("{more}");
    sampler.finish();
    Ok(())
}
