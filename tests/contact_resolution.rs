//! End-to-end contact resolution scenarios.

use approx::assert_relative_eq;
use nalgebra::{DMatrix, DVector};
use sim_impulse::{
    ContactDims, ContactMaterial, ContactProblem, ContactResolver, Regularization,
};

/// Two unit point masses on one axis approaching at relative velocity -1.
/// Returns (v, minv, jac) for a single normal-only contact.
fn head_on_fixture() -> (DMatrix<f64>, DMatrix<f64>, DMatrix<f64>) {
    let v = DMatrix::from_row_slice(1, 2, &[-0.5, 0.5]);
    let minv = DMatrix::identity(2, 2);
    let jac = DMatrix::from_row_slice(1, 2, &[1.0, -1.0]);
    (v, minv, jac)
}

fn tight_resolver() -> ContactResolver {
    ContactResolver::new().with_regularization(Regularization::Fixed(1e-9))
}

#[test]
fn inelastic_head_on_collision_cancels_approach() {
    let (v, minv, jac) = head_on_fixture();
    let dims = ContactDims { n_cld: 1, d: 1, n: 2 };
    let jac_v = &jac * v.row(0).transpose();
    assert_relative_eq!(jac_v[0], -1.0);
    let v_star = DVector::zeros(1);
    let materials = [ContactMaterial::frictionless()];

    let dv = tight_resolver()
        .resolve(&ContactProblem {
            bs_idx: 0,
            v: &v,
            minv: &minv,
            jac: &jac,
            jac_v: &jac_v,
            v_star: &v_star,
            materials: &materials,
            j_e: None,
            dims,
        })
        .unwrap();

    // Post-impulse relative normal velocity is zero
    let v_post = v.row(0).transpose() + dv.row(0).transpose();
    let rel = (&jac * v_post)[0];
    assert_relative_eq!(rel, 0.0, epsilon = 1e-6);
}

#[test]
fn elastic_head_on_collision_bounces() {
    let (v, minv, jac) = head_on_fixture();
    let dims = ContactDims { n_cld: 1, d: 1, n: 2 };
    let jac_v = &jac * v.row(0).transpose();
    // Caller-supplied target: reflect the approach velocity
    let v_star = DVector::from_element(1, 1.0);
    let materials = [ContactMaterial::frictionless().with_restitution(1.0)];

    let dv = tight_resolver()
        .resolve(&ContactProblem {
            bs_idx: 0,
            v: &v,
            minv: &minv,
            jac: &jac,
            jac_v: &jac_v,
            v_star: &v_star,
            materials: &materials,
            j_e: None,
            dims,
        })
        .unwrap();

    // Post-impulse relative normal velocity is +1 (full bounce)
    let v_post = v.row(0).transpose() + dv.row(0).transpose();
    let rel = (&jac * v_post)[0];
    assert_relative_eq!(rel, 1.0, epsilon = 1e-6);
}

#[test]
fn partial_restitution_scales_the_bounce() {
    let (v, minv, jac) = head_on_fixture();
    let dims = ContactDims { n_cld: 1, d: 1, n: 2 };
    let jac_v = &jac * v.row(0).transpose();
    let cor = 0.5;
    let v_star = DVector::from_element(1, cor);
    let materials = [ContactMaterial::frictionless().with_restitution(cor)];

    let dv = tight_resolver()
        .resolve(&ContactProblem {
            bs_idx: 0,
            v: &v,
            minv: &minv,
            jac: &jac,
            jac_v: &jac_v,
            v_star: &v_star,
            materials: &materials,
            j_e: None,
            dims,
        })
        .unwrap();

    let v_post = v.row(0).transpose() + dv.row(0).transpose();
    let rel = (&jac * v_post)[0];
    assert_relative_eq!(rel, cor, epsilon = 1e-6);
}

#[test]
fn sliding_block_is_slowed_by_friction_and_stopped_normally() {
    // A unit-mass block sliding (vx = 1) and falling (vy = -1) onto static
    // ground (infinite mass: zero inverse mass). One contact, d = 2:
    // contact row 0 = normal (y), row 1 = tangent (x).
    let dims = ContactDims { n_cld: 1, d: 2, n: 2 };
    let v = DMatrix::from_row_slice(1, 4, &[1.0, -1.0, 0.0, 0.0]);
    let minv = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 0.0]);
    let jac = DMatrix::from_row_slice(
        2,
        4,
        &[
            0.0, 1.0, 0.0, -1.0, // normal: relative y velocity
            1.0, 0.0, -1.0, 0.0, // tangent: relative x velocity
        ],
    );
    let jac_v = &jac * v.row(0).transpose();
    let v_star = DVector::zeros(2);
    let materials = [ContactMaterial::default().with_friction(0.5)];

    let dv = tight_resolver()
        .resolve(&ContactProblem {
            bs_idx: 0,
            v: &v,
            minv: &minv,
            jac: &jac,
            jac_v: &jac_v,
            v_star: &v_star,
            materials: &materials,
            j_e: None,
            dims,
        })
        .unwrap();

    // Normal impulse 1 stops the fall; friction is capped at mu * 1 = 0.5
    assert_relative_eq!(dv[(0, 0)], -0.5, epsilon = 1e-6); // vx: 1.0 -> 0.5
    assert_relative_eq!(dv[(0, 1)], 1.0, epsilon = 1e-6); // vy: -1.0 -> 0.0
    // The static ground is untouched
    assert_eq!(dv[(0, 2)], 0.0);
    assert_eq!(dv[(0, 3)], 0.0);

    let v_post = v.row(0).transpose() + dv.row(0).transpose();
    let rel = &jac * v_post;
    assert_relative_eq!(rel[0], 0.0, epsilon = 1e-6); // no penetration
    assert!(rel[1] > 0.0); // still sliding: friction alone cannot stop it
}

#[test]
fn equality_constrained_pair_stops_together() {
    // Two unit masses rigidly linked (v0 - v1 = 0), moving toward a static
    // wall touched by body 0 only. The impulse must arrest both bodies
    // without leaving the constraint manifold.
    let dims = ContactDims { n_cld: 1, d: 1, n: 2 };
    let v = DMatrix::from_row_slice(1, 2, &[-1.0, -1.0]);
    let minv = DMatrix::identity(2, 2);
    let jac = DMatrix::from_row_slice(1, 2, &[1.0, 0.0]);
    let j_e = DMatrix::from_row_slice(1, 2, &[1.0, -1.0]);
    let jac_v = &jac * v.row(0).transpose();
    let v_star = DVector::zeros(1);
    let materials = [ContactMaterial::frictionless()];

    let dv = tight_resolver()
        .resolve(&ContactProblem {
            bs_idx: 0,
            v: &v,
            minv: &minv,
            jac: &jac,
            jac_v: &jac_v,
            v_star: &v_star,
            materials: &materials,
            j_e: Some(&j_e),
            dims,
        })
        .unwrap();

    let v_post = v.row(0).transpose() + dv.row(0).transpose();
    // Contact resolved
    assert_relative_eq!((&jac * &v_post)[0], 0.0, epsilon = 1e-6);
    // Bilateral constraint still satisfied
    assert_relative_eq!((&j_e * &v_post)[0], 0.0, epsilon = 1e-6);
    // Both bodies stop
    assert_relative_eq!(v_post[0], 0.0, epsilon = 1e-6);
    assert_relative_eq!(v_post[1], 0.0, epsilon = 1e-6);
}

#[test]
fn over_constrained_contacts_still_resolve() {
    // Three redundant contacts on a single 1-DOF body (n_cld > n): the
    // target projection must keep the cone program bounded.
    let dims = ContactDims { n_cld: 3, d: 1, n: 1 };
    let v = DMatrix::from_row_slice(1, 1, &[-1.0]);
    let minv = DMatrix::identity(1, 1);
    let jac = DMatrix::from_row_slice(3, 1, &[1.0, 1.0, 1.0]);
    let jac_v = &jac * v.row(0).transpose();
    let v_star = DVector::from_vec(vec![0.3, 0.0, -0.1]);
    let materials = [ContactMaterial::frictionless(); 3];

    let dv = tight_resolver()
        .resolve(&ContactProblem {
            bs_idx: 0,
            v: &v,
            minv: &minv,
            jac: &jac,
            jac_v: &jac_v,
            v_star: &v_star,
            materials: &materials,
            j_e: None,
            dims,
        })
        .unwrap();

    let v_post = v.row(0).transpose() + dv.row(0).transpose();
    let rel = &jac * v_post;
    // All three (identical) contact directions end non-penetrating
    for i in 0..3 {
        assert!(rel[i] > -1e-6, "contact {i} penetrates: {}", rel[i]);
    }
}

#[test]
fn resolve_twice_is_idempotent() {
    let (v, minv, jac) = head_on_fixture();
    let dims = ContactDims { n_cld: 1, d: 1, n: 2 };
    let jac_v = &jac * v.row(0).transpose();
    let v_star = DVector::zeros(1);
    let materials = [ContactMaterial::frictionless()];
    let problem = ContactProblem {
        bs_idx: 0,
        v: &v,
        minv: &minv,
        jac: &jac,
        jac_v: &jac_v,
        v_star: &v_star,
        materials: &materials,
        j_e: None,
        dims,
    };

    let resolver = ContactResolver::new();
    assert_eq!(resolver.resolve(&problem).unwrap(), resolver.resolve(&problem).unwrap());
}
