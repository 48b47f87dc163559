use topika::datatype::{GeoCoordinate, Literal, xsd};
use topika::error::TopikaError;

#[test]
fn literals_carry_value_and_datatype_together() {
    let literal = Literal::integer(42);
    assert_eq!(literal.value(), "42");
    assert_eq!(literal.datatype(), xsd::INTEGER);
    let literal = Literal::boolean(true);
    assert_eq!(literal.value(), "true");
    assert_eq!(literal.datatype(), xsd::BOOLEAN);
}

#[test]
fn coercion_reads_the_stored_lexical_form() {
    let literal = Literal::new("117", xsd::INTEGER).expect("literal");
    assert_eq!(literal.to_integer().expect("integer"), 117);
    assert_eq!(literal.to_long().expect("long"), 117);
    assert_eq!(literal.to_double().expect("double"), 117.0);
    assert_eq!(
        literal.to_decimal().expect("decimal").to_string(),
        "117"
    );
    let literal = Literal::new("true", xsd::BOOLEAN).expect("literal");
    assert!(literal.to_boolean().expect("boolean"));
    let literal = Literal::new("2004-06-19", xsd::DATE).expect("literal");
    assert_eq!(
        literal.to_date().expect("date").to_string(),
        "2004-06-19"
    );
    let literal = Literal::new("2004-06-19T12:30:00", xsd::DATE_TIME).expect("literal");
    assert_eq!(
        literal.to_datetime().expect("datetime").to_string(),
        "2004-06-19 12:30:00"
    );
    let literal = Literal::iri("http://example.org/page").expect("literal");
    assert_eq!(literal.to_iri().expect("iri"), "http://example.org/page");
}

#[test]
fn failed_coercion_reports_the_target_type() {
    let literal = Literal::string("not a number");
    let error = literal.to_integer().expect_err("unparseable");
    match error {
        TopikaError::Coercion { value, target } => {
            assert_eq!(value, "not a number");
            assert_eq!(target, "integer");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(literal.to_boolean().is_err());
    assert!(literal.to_date().is_err());
    assert!(literal.to_decimal().is_err());
    assert!(literal.to_coordinate().is_err());
}

#[test]
fn geographic_coordinates_round_trip() {
    let coordinate = GeoCoordinate::new(59.3293, 18.0686).expect("valid");
    let literal = Literal::coordinate(coordinate);
    let back = literal.to_coordinate().expect("coordinate");
    assert_eq!(back, coordinate);
    assert!(GeoCoordinate::new(95.0, 0.0).is_none(), "latitude bounds");
    let literal = Literal::new("59.0,18.0;59.1,18.0;59.1,18.1", topika::datatype::WGS84_SURFACE)
        .expect("literal");
    assert_eq!(literal.to_surface().expect("surface").0.len(), 3);
    let literal = Literal::new("59.0,18.0", topika::datatype::WGS84_SURFACE).expect("literal");
    assert!(literal.to_surface().is_err(), "a surface needs a ring");
}
