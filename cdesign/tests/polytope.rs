use cdesign::{
    CategoricalInput, Constraint, ContinuousInput, DiscreteInput, Domain, Input, PolytopeSampler,
    Result, SamplerOptions, SamplerState, Warning, sample_polytope,
};

const EQ_EPS: f64 = 1e-6;

fn mixture_domain() -> Result<Domain> {
    let inputs: Vec<Input> = vec![
        ContinuousInput::new("x1", 0., 1.)?.into(),
        ContinuousInput::new("x2", 0.1, 1.)?.into(),
        ContinuousInput::new("x3", 0., 0.6)?.into(),
        ContinuousInput::new("t", 2., 2.)?.into(),
        DiscreteInput::new("d", vec![1., 5., 3.])?.into(),
        CategoricalInput::new("c", vec!["a".into(), "b".into(), "c".into()])?
            .with_allowed(vec![true, false, true])?
            .into(),
    ];
    let constraints = vec![
        Constraint::linear_equality(&["x1", "x2", "x3"], vec![1., 1., 1.], 1.)?,
        Constraint::linear_inequality(&["x1", "x3"], vec![1., -1.], 0.2)?,
    ];
    Domain::new(inputs, vec![], constraints)
}

#[test]
fn test_samples_fulfill_constraints() -> Result<()> {
    let domain = mixture_domain()?;
    let table = sample_polytope(&domain, 25, 500, 16, 11)?;
    assert_eq!(table.nrows(), 25);
    domain.validate_candidates(&table)?;
    for ok in domain.constraints_fulfilled(&table, EQ_EPS)? {
        assert!(ok);
    }
    assert!(table.numeric("t")?.iter().all(|t| *t == 2.));
    assert!(table.categorical("c")?.iter().all(|c| c != "b"));
    Ok(())
}

#[test]
fn test_same_seed_same_samples() -> Result<()> {
    let domain = mixture_domain()?;
    let first = sample_polytope(&domain, 10, 100, 4, 5)?;
    let second = sample_polytope(&domain, 10, 100, 4, 5)?;
    assert_eq!(first, second);
    let other = sample_polytope(&domain, 10, 100, 4, 6)?;
    assert_ne!(first, other);
    Ok(())
}

#[test]
fn test_nchoosek_samples() -> Result<()> {
    let keys = ["x1", "x2", "x3", "x4"];
    let inputs = keys
        .iter()
        .map(|k| Ok(ContinuousInput::new(*k, 0., 1.)?.into()))
        .collect::<Result<Vec<Input>>>()?;
    let constraints = vec![
        Constraint::linear_equality(&keys, vec![1.; 4], 1.)?,
        Constraint::nchoosek(&keys, 1, 2, false)?,
    ];
    let domain = Domain::new(inputs, vec![], constraints)?;
    let table = sample_polytope(&domain, 20, 200, 8, 1)?;
    assert_eq!(table.nrows(), 20);
    for r in 0..20 {
        let values = keys
            .iter()
            .map(|k| Ok(table.numeric(k)?[r]))
            .collect::<Result<Vec<f64>>>()?;
        let nonzero = values.iter().filter(|v| v.abs() > EQ_EPS).count();
        assert!((1..=2).contains(&nonzero), "row {r}: {values:?}");
        assert!((values.iter().sum::<f64>() - 1.).abs() < EQ_EPS);
    }
    Ok(())
}

#[test]
fn test_sampler_lifecycle() -> Result<()> {
    let domain = mixture_domain()?;
    let mut sampler = PolytopeSampler::new(&domain, SamplerOptions::new().with_seed(2));
    assert_eq!(sampler.state(), SamplerState::Idle);
    let first = sampler.ask(3)?;
    assert_eq!(sampler.state(), SamplerState::Sampled);
    let second = sampler.ask(3)?;
    assert_ne!(first, second);
    sampler.finish();
    assert_eq!(sampler.state(), SamplerState::Done);
    assert_eq!(sampler.ask(3)?, first);
    Ok(())
}

#[test]
fn test_fully_fixed_domain_warns() -> Result<()> {
    let inputs: Vec<Input> = vec![
        ContinuousInput::new("x1", 0.5, 0.5)?.into(),
        ContinuousInput::new("x2", 0.5, 0.5)?.into(),
    ];
    let domain = Domain::new(inputs, vec![], vec![])?;
    let mut sampler = PolytopeSampler::new(&domain, SamplerOptions::new());
    let table = sampler.ask(1)?;
    assert_eq!(table.numeric("x1")?, &[0.5]);
    assert!(sampler.warnings().contains(&Warning::DegenerateSample));
    Ok(())
}
